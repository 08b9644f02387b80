use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// One tokenized script line: `tokens[0]` is the command, the rest are raw arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instruction {
    tokens: Vec<String>,
}

impl Instruction {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Split a line on whitespace. No quoting, escaping, or comments.
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn command(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl From<Vec<String>> for Instruction {
    fn from(tokens: Vec<String>) -> Self {
        Self::new(tokens)
    }
}

impl From<&str> for Instruction {
    fn from(line: &str) -> Self {
        Self::parse(line)
    }
}

/// Parse script text into instructions, skipping blank lines.
pub fn parse_script(text: &str) -> Vec<Instruction> {
    text.lines()
        .map(Instruction::parse)
        .filter(|i| !i.is_empty())
        .collect()
}

/// Parse a script from any reader.
pub fn load_from_reader<R: Read>(reader: R) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read script line {}", idx + 1))?;
        let instruction = Instruction::parse(&line);
        if !instruction.is_empty() {
            out.push(instruction);
        }
    }
    Ok(out)
}

/// Read and parse a script file. An unreadable file is fatal.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Instruction>> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open commands file {}", path_ref.display()))?;
    let instructions = load_from_reader(file)
        .with_context(|| format!("Failed to parse commands file {}", path_ref.display()))?;
    debug!(
        target: "otto::runtime",
        path = %path_ref.display(), commands = instructions.len(),
        "Parsed commands file"
    );
    Ok(instructions)
}
