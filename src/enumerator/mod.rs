use std::io;
use std::path::Path;

use clap::ValueEnum;
use futures::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

// the Mode enum selects how a candidate is combined with the base target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    #[default]
    #[value(alias = "path")]
    Dir,
    #[value(alias = "subdomain")]
    Sub,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        Self::from_str(value.trim(), true).ok()
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Dir => "dir",
            Mode::Sub => "sub",
        }
    }
}

/// Builds the probe URL for one candidate.
///
/// `Dir` appends `/candidate` to the base. `Sub` prefixes `candidate.`; when the
/// base carries a scheme the prefix goes right after `scheme://`. Nothing is
/// encoded or validated here.
pub fn build_url(base: &str, candidate: &str, mode: Mode) -> String {
    match mode {
        Mode::Dir => format!("{}/{}", base, candidate),
        Mode::Sub => match base.split_once("://") {
            Some((scheme, rest)) => format!("{}://{}.{}", scheme, candidate, rest),
            None => format!("{}.{}", candidate, base),
        },
    }
}

// every byte maps to the code point of the same value, so this never fails
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Single-pass reader over a word list file.
///
/// Lines end at `\n`, `\r` or `\r\n`, are decoded as Latin-1 and trimmed.
/// Blank lines are still yielded as empty candidates.
pub struct Wordlist {
    reader: BufReader<File>,
    buf: Vec<u8>,
    // last line ended in `\r`; a `\n` right after it belongs to that line
    after_cr: bool,
}

impl Wordlist {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let handle = File::open(path).await?;
        Ok(Self {
            reader: BufReader::new(handle),
            buf: Vec::new(),
            after_cr: false,
        })
    }

    pub async fn next_candidate(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let mut terminated = false;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            if self.after_cr {
                self.after_cr = false;
                if available[0] == b'\n' {
                    self.reader.consume(1);
                    continue;
                }
            }
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(end) => {
                    self.buf.extend_from_slice(&available[..end]);
                    self.after_cr = available[end] == b'\r';
                    self.reader.consume(end + 1);
                    terminated = true;
                    break;
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
        if !terminated && self.buf.is_empty() {
            return Ok(None);
        }
        let line = decode_latin1(&self.buf);
        Ok(Some(line.trim().to_string()))
    }

    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        stream::unfold(Some(self), |state| async move {
            let mut wordlist = state?;
            match wordlist.next_candidate().await {
                Ok(Some(candidate)) => Some((Ok(candidate), Some(wordlist))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Counts the candidates a word list will yield, using the same line rules as
/// [`Wordlist`].
pub async fn count_candidates(path: impl AsRef<Path>) -> io::Result<usize> {
    let mut wordlist = Wordlist::open(path).await?;
    let mut total = 0usize;
    while wordlist.next_candidate().await?.is_some() {
        total += 1;
    }
    Ok(total)
}
