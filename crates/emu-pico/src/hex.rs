//! Program loader for `.hex` listings.
//!
//! One 16-bit hex word per line, `//` comments (full-line or trailing),
//! blank lines ignored. At most 32 words; loaded at a caller-supplied
//! origin, wrapping inside the instruction memory.

use std::error::Error;
use std::fmt;

use rp2040_pio::constants::MEMORY_SIZE;
use rp2040_pio::Pio;

/// Failure to parse a program listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// A line that is neither a word, a comment nor blank.
    BadWord { line: usize, text: String },
    /// More than `MEMORY_SIZE` words.
    TooLong { words: usize },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadWord { line, text } => {
                write!(f, "line {line}: expected a 16-bit hex word, got {text:?}")
            }
            Self::TooLong { words } => {
                write!(f, "program has {words} words, memory holds {MEMORY_SIZE}")
            }
        }
    }
}

impl Error for ProgramError {}

/// Parse a `.hex` listing into instruction words.
pub fn parse_hex_program(text: &str) -> Result<Vec<u16>, ProgramError> {
    let mut words = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = match line.split_once("//") {
            Some((before, _)) => before,
            None => line,
        };
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let word = u16::from_str_radix(token, 16).map_err(|_| ProgramError::BadWord {
            line: index + 1,
            text: token.to_string(),
        })?;
        words.push(word);
    }
    if words.len() > MEMORY_SIZE {
        return Err(ProgramError::TooLong { words: words.len() });
    }
    Ok(words)
}

/// Parse a listing and load it into a block's memory at `origin`.
pub fn load_hex_program(pio: &mut Pio, origin: u32, text: &str) -> Result<usize, ProgramError> {
    let words = parse_hex_program(text)?;
    pio.memory_mut().load(origin, &words);
    Ok(words.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_words_comments_and_blanks() {
        let listing = "\
// squarewave
e081
e101 // set pins, 1 [1]

e000
0001
";
        assert_eq!(
            parse_hex_program(listing),
            Ok(vec![0xE081, 0xE101, 0xE000, 0x0001])
        );
    }

    #[test]
    fn reports_the_offending_line() {
        assert_eq!(
            parse_hex_program("e081\nnot-hex\n"),
            Err(ProgramError::BadWord {
                line: 2,
                text: "not-hex".into()
            })
        );
    }

    #[test]
    fn rejects_oversized_programs() {
        let listing = "0000\n".repeat(33);
        assert_eq!(
            parse_hex_program(&listing),
            Err(ProgramError::TooLong { words: 33 })
        );
    }

    #[test]
    fn loads_at_the_requested_origin() {
        let mut pio = Pio::new(0);
        assert_eq!(load_hex_program(&mut pio, 4, "e021\ne042\n"), Ok(2));
        assert_eq!(pio.memory().fetch(4), 0xE021);
        assert_eq!(pio.memory().fetch(5), 0xE042);
    }
}
