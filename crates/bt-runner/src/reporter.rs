//! Parsing of the benchmark's reporter output.
//!
//! The benchmark prints one tab-separated table per requested reporter, in
//! request order, separated by a blank line. The first line of a table is its
//! header. A reporter that produced nothing leaves an empty table.

use bt_types::{ReportError, ReporterBlock, ReporterSpec, RunResult};
use csv::ReaderBuilder;

/// Split stdout into per-reporter line groups. Trailing blank lines are
/// ignored; every other blank line closes a block.
fn split_blocks(stdout: &str) -> Vec<Vec<&str>> {
    let lines: Vec<&str> = stdout.lines().map(|l| l.trim_end_matches('\r')).collect();
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(0, |i| i + 1);

    if end == 0 {
        return Vec::new();
    }

    let mut blocks = vec![Vec::new()];
    for line in &lines[..end] {
        if line.trim().is_empty() {
            blocks.push(Vec::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push(*line);
        }
    }
    blocks
}

fn parse_block(reporter: &ReporterSpec, lines: &[&str]) -> Result<ReporterBlock, ReportError> {
    if lines.is_empty() {
        return Ok(ReporterBlock::empty(reporter.clone()));
    }

    let text = lines.join("\n");
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != header.len() {
            return Err(ReportError::FieldCountMismatch {
                reporter: reporter.name.clone(),
                line: i + 2,
                expected: header.len(),
                found: record.len(),
            });
        }
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(ReporterBlock {
        reporter: reporter.clone(),
        header,
        records,
    })
}

/// Parse the stdout of one benchmark run into per-reporter blocks.
///
/// Output that stops early (a crashed run) yields empty blocks for the
/// reporters that never printed. More blocks than requested reporters, or a
/// record whose width differs from its header, is an error.
pub fn parse_reporter_output(
    stdout: &str,
    reporters: &[ReporterSpec],
) -> Result<RunResult, ReportError> {
    let groups = split_blocks(stdout);
    if groups.len() > reporters.len() {
        return Err(ReportError::UnexpectedBlocks {
            expected: reporters.len(),
            found: groups.len(),
        });
    }

    let mut blocks = Vec::with_capacity(reporters.len());
    for (i, reporter) in reporters.iter().enumerate() {
        let lines = groups.get(i).map(Vec::as_slice).unwrap_or(&[]);
        blocks.push(parse_block(reporter, lines)?);
    }

    Ok(RunResult::new(blocks))
}
