//! Text exchange with the external solver.
//!
//! Examples are written as named blocks:
//!
//! ```text
//! name: agent3-1
//! I: 0 0 1 1 ;
//!
//! name: agent7
//! I: 1 1 0 0 ;
//! ```
//!
//! New states are read back from a window of two line ranges in the
//! solver's output file, one value per line in the first column.

use crate::error::{Error, Result};
use crate::sampling::InfluenceExample;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, ops::RangeInclusive, path::Path};

/// Tag in front of the values of an example block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExampleTag {
    #[default]
    #[serde(rename = "I")]
    Input,
    #[serde(rename = "B")]
    Both,
}

impl fmt::Display for ExampleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "I"),
            Self::Both => write!(f, "B"),
        }
    }
}

/// Format a single example block.
pub fn format_example<T: fmt::Display>(label: &str, values: &[T], tag: ExampleTag) -> String {
    let values: Vec<String> = values.iter().map(|val| val.to_string()).collect();
    format!("name: {label}\n{tag}: {} ;\n", values.join(" "))
}

/// Format influence examples, blocks separated by blank lines.
pub fn format_examples(examples: &[InfluenceExample], tag: ExampleTag) -> String {
    examples
        .iter()
        .map(|ex| format_example(&ex.label, &ex.values, tag))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format mutated prototype copies used to train an agent's network.
pub fn format_training_examples(examples: &[Vec<u8>], tag: ExampleTag) -> String {
    examples
        .iter()
        .enumerate()
        .map(|(idx, bits)| format_example(&format!("sit{idx}"), bits, tag))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write exchange text to `file`.
pub fn write_exchange_file<P: AsRef<Path>>(file: P, contents: &str) -> Result<()> {
    let file = file.as_ref();
    fs::write(file, contents).map_err(|err| Error::solver_io(format!("failed to write {file:?}"), err))
}

/// Two inclusive, 1-based line ranges of the solver output holding the new
/// state's positive and negative banks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 4]", into = "[usize; 4]")]
pub struct OutputWindow {
    first: RangeInclusive<usize>,
    second: RangeInclusive<usize>,
}

impl OutputWindow {
    pub fn new(start1: usize, end1: usize, start2: usize, end2: usize) -> Result<Self> {
        if start1 == 0 || start2 == 0 || start1 > end1 || start2 > end2 {
            return Err(Error::solver(format!(
                "invalid output window ({start1}, {end1}, {start2}, {end2})"
            )));
        }
        if start2 <= end1 && start1 <= end2 {
            return Err(Error::solver(format!(
                "output window ranges overlap: {start1}..={end1} and {start2}..={end2}"
            )));
        }
        Ok(Self {
            first: start1..=end1,
            second: start2..=end2,
        })
    }

    /// Number of values the window yields.
    pub fn n_values(&self) -> usize {
        self.first.clone().count() + self.second.clone().count()
    }

    fn contains(&self, line_num: usize) -> bool {
        self.first.contains(&line_num) || self.second.contains(&line_num)
    }
}

impl TryFrom<[usize; 4]> for OutputWindow {
    type Error = Error;

    fn try_from(value: [usize; 4]) -> Result<Self> {
        let [start1, end1, start2, end2] = value;
        Self::new(start1, end1, start2, end2)
    }
}

impl From<OutputWindow> for [usize; 4] {
    fn from(window: OutputWindow) -> Self {
        [
            *window.first.start(),
            *window.first.end(),
            *window.second.start(),
            *window.second.end(),
        ]
    }
}

/// Parse the values inside `window` from solver output, in file order.
pub fn parse_output(text: &str, window: &OutputWindow) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(window.n_values());
    for (line_idx, line) in text.lines().enumerate() {
        let line_num = line_idx + 1;
        if !window.contains(line_num) {
            continue;
        }
        let token = line
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::solver(format!("output line {line_num} is empty")))?;
        let value = token.parse::<f64>().map_err(|err| {
            Error::solver(format!("output line {line_num}: cannot parse {token:?}: {err}"))
        })?;
        values.push(value);
    }

    if values.len() != window.n_values() {
        return Err(Error::solver(format!(
            "output window expects {} values, but the file holds {}",
            window.n_values(),
            values.len()
        )));
    }
    Ok(values)
}

/// Read solver output from `file` and parse it.
pub fn read_output<P: AsRef<Path>>(file: P, window: &OutputWindow) -> Result<Vec<f64>> {
    let file = file.as_ref();
    let text = fs::read_to_string(file)
        .map_err(|err| Error::solver_io(format!("failed to read {file:?}"), err))?;
    parse_output(&text, window)
}
