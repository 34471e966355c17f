use super::{ExportFormat, Renderer};
use crate::{AnalysisRun, Chunk, Error, Result, RunStatus, UnitOutcome};
use regex::Regex;
use std::fmt::Write;

/// Markdown document with one section per chunk and one subsection per unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    fn render(&self, run: &AnalysisRun, chunks: &[Chunk<'_>]) -> Result<Vec<u8>> {
        let mut output = String::new();
        write_document(&mut output, run, chunks).map_err(|e| Error::Export(e.to_string()))?;

        // collapse runs of blank lines
        let blank_lines = Regex::new(r"\n{3,}").map_err(|e| Error::Export(e.to_string()))?;
        let output = blank_lines.replace_all(&output, "\n\n");
        Ok(output.into_owned().into_bytes())
    }
}

fn write_document(out: &mut String, run: &AnalysisRun, chunks: &[Chunk<'_>]) -> std::fmt::Result {
    writeln!(out, "# Code Pager\n")?;
    writeln!(out, "- Run: `{}`", run.run_id)?;
    writeln!(out, "- Source: `{}`", run.source)?;
    if run.status == RunStatus::Cancelled {
        writeln!(out, "- Status: cancelled, partial results")?;
    }
    writeln!(
        out,
        "- Units: {} ({} ok, {} failed)",
        run.stats.total, run.stats.succeeded, run.stats.failed
    )?;
    writeln!(out, "- Tokens: {}\n", run.stats.total_tokens)?;

    for chunk in chunks {
        let marker = if chunk.is_final { ", final" } else { "" };
        writeln!(
            out,
            "## Chunk {} ({} tokens{})\n",
            chunk.sequence_number, chunk.token_count, marker
        )?;

        for item in &chunk.items {
            writeln!(out, "### {}\n", item.unit_id)?;
            match &item.outcome {
                UnitOutcome::Ok { content } => {
                    let body = serde_json::to_string_pretty(content).map_err(|_| std::fmt::Error)?;
                    writeln!(out, "```json\n{}\n```\n", body)?;
                }
                UnitOutcome::Failed { error } => {
                    writeln!(out, "> Failed: {}\n", error)?;
                }
            }
        }
    }
    Ok(())
}
