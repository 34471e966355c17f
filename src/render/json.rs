use super::{ExportFormat, Renderer};
use crate::{AnalysisRun, Chunk, Error, Result, RunStats, RunStatus};
use serde::Serialize;

/// Pretty-printed JSON document of a run and its chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

#[derive(Serialize)]
struct Document<'a> {
    run_id: &'a str,
    source: &'a str,
    status: RunStatus,
    stats: &'a RunStats,
    chunks: &'a [Chunk<'a>],
}

impl Renderer for JsonRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn render(&self, run: &AnalysisRun, chunks: &[Chunk<'_>]) -> Result<Vec<u8>> {
        let document = Document {
            run_id: &run.run_id,
            source: &run.source,
            status: run.status,
            stats: &run.stats,
            chunks,
        };
        serde_json::to_vec_pretty(&document).map_err(|e| Error::Export(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::sample_run;
    use crate::{PaginationEngine, StrategyKind};

    #[test]
    fn test_json_document() {
        let run = sample_run();
        let engine = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 100).unwrap();
        let chunks = engine.collect_chunks(&run).unwrap();

        let bytes = JsonRenderer.render(&run, &chunks).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["run_id"], "run-1");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["chunks"][0]["token_count"], 17);
        assert_eq!(value["chunks"][0]["items"][1]["status"], "failed");
        assert_eq!(value["chunks"][0]["items"][1]["error"]["kind"], "timeout");
        assert_eq!(value["chunks"][0]["is_final"], true);
    }
}
