use crate::{CodePager, PageRequest, Pager, PagerConfig, StrategyKind};
use rmcp::{
    Error as McpError, ServerHandler,
    model::{CallToolResult, Content, ErrorCode, ServerCapabilities, ServerInfo},
    schemars, tool,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// CodePager MCP server implementation
#[derive(Clone)]
pub struct CodePagerMcp {
    pager: Arc<CodePager>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AnalyzeRequest {
    #[schemars(description = "Path to source code. Please provide the absolute path.")]
    pub path: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct GetPageRequest {
    #[schemars(description = "Run id returned by the analyze tool")]
    pub run_id: String,

    #[schemars(description = "Continuation token from the previous page. Omit for the first page.")]
    pub continuation_token: Option<String>,

    #[schemars(description = "Pagination strategy (smart, chunk_by_chunk, file_by_file). Defaults to the server's configured strategy.")]
    pub strategy: Option<String>,

    #[schemars(description = "Maximum estimated tokens per page")]
    pub token_budget: Option<usize>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct RenderRequest {
    #[schemars(description = "Run id returned by the analyze tool")]
    pub run_id: String,

    #[schemars(description = "Export format (markdown, json)")]
    pub format: String,

    #[schemars(description = "Output file path. Please provide the absolute path. Omit to return the document.")]
    pub output: Option<String>,
}

/// Helper function to create an invalid argument error
fn invalid_argument_error(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode::INVALID_PARAMS, message.into(), None)
}

/// Helper function to create an internal error
fn internal_error(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode::INTERNAL_ERROR, message.into(), None)
}

fn to_mcp_error(err: crate::Error) -> McpError {
    if err.is_caller_error() {
        invalid_argument_error(err.to_string())
    } else {
        internal_error(err.to_string())
    }
}

fn json_result(value: &impl serde::Serialize) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| internal_error(format!("Failed to serialize result: {}", e)))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool(tool_box)]
impl CodePagerMcp {
    pub fn new(config: PagerConfig) -> crate::Result<Self> {
        Ok(Self::with_pager(Arc::new(CodePager::try_new(config)?)))
    }

    pub fn with_pager(pager: Arc<CodePager>) -> Self {
        Self { pager }
    }

    pub fn pager(&self) -> &CodePager {
        &self.pager
    }

    #[tool(
        description = "Analyze a codebase concurrently and store the results. Returns a run id to page through the analysis with get_page or to export it with render."
    )]
    async fn analyze(&self, #[tool(aggr)] req: AnalyzeRequest) -> Result<CallToolResult, McpError> {
        let path = PathBuf::from(&req.path);
        if !path.exists() {
            return Err(invalid_argument_error(format!(
                "Path does not exist: {}",
                path.display()
            )));
        }

        let source = self.pager.fs_source(&path);
        let run_id = self.pager.analyze(&source).await.map_err(to_mcp_error)?;
        let run = self.pager.run(&run_id).map_err(to_mcp_error)?;

        json_result(&json!({
            "run_id": run_id,
            "source": run.source,
            "status": run.status,
            "stats": run.stats,
            "failed_units": run.failed_ids(),
        }))
    }

    #[tool(
        description = "Get the next page of an analysis run. Each page fits the token budget. Pass the continuation_token of a page to get the one after it; the last page has no token."
    )]
    async fn get_page(&self, #[tool(aggr)] req: GetPageRequest) -> Result<CallToolResult, McpError> {
        let strategy = req
            .strategy
            .as_deref()
            .map(str::parse::<StrategyKind>)
            .transpose()
            .map_err(to_mcp_error)?;

        let request = PageRequest {
            run_id: req.run_id,
            continuation: req.continuation_token.filter(|t| !t.is_empty()),
            strategy,
            token_budget: req.token_budget,
        };
        let page = self.pager.get_page(&request).await.map_err(to_mcp_error)?;
        json_result(&page)
    }

    #[tool(
        description = "Export a whole analysis run as a markdown or json document, returned inline or saved to an output file."
    )]
    async fn render(&self, #[tool(aggr)] req: RenderRequest) -> Result<CallToolResult, McpError> {
        let bytes = self
            .pager
            .render(&req.run_id, &req.format)
            .await
            .map_err(to_mcp_error)?;

        match req.output {
            Some(output) => {
                let output = PathBuf::from(output);
                tokio::fs::write(&output, &bytes)
                    .await
                    .map_err(|e| internal_error(format!("Failed to write to file: {}", e)))?;
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Successfully rendered run {} and saved to {}",
                    req.run_id,
                    output.display()
                ))]))
            }
            None => Ok(CallToolResult::success(vec![Content::text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )])),
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for CodePagerMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "A CodePager MCP server: analyze a codebase once, then read the analysis page by page within a token budget".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_error_codes() {
        let err = to_mcp_error(Error::InvalidContext("bad".to_string()));
        assert_eq!(err.code.0, ErrorCode::INVALID_PARAMS.0);
        let err = to_mcp_error(Error::Export("disk".to_string()));
        assert_eq!(err.code.0, ErrorCode::INTERNAL_ERROR.0);
    }
}
