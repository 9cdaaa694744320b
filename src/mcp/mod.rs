//! MCP (Model Context Protocol) front end for the index.
//!
//! Exposes the query surface as MCP tools over stdio so editor plugins and
//! AI assistants can drive the engine. Query-behavior policy is enforced by
//! the indexer itself: tools arriving mid-index observe `allow_partial`,
//! `block`, or `reject` semantics.

use crate::error::IndexError;
use crate::indexing::CppIndexer;
use crate::search::SearchFilters;
use crate::types::SymbolKind;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

fn tool_error(e: IndexError) -> CallToolResult {
    let mut text = e.to_string();
    for hint in e.recovery_suggestions() {
        text.push_str("\n  hint: ");
        text.push_str(hint);
    }
    CallToolResult::error(vec![Content::text(text)])
}

fn tool_json<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(json) => CallToolResult::success(vec![Content::text(json)]),
        Err(e) => CallToolResult::error(vec![Content::text(format!("serialization error: {e}"))]),
    }
}

fn parse_kinds(kinds: &Option<Vec<String>>) -> Result<Option<Vec<SymbolKind>>, CallToolResult> {
    let Some(kinds) = kinds else {
        return Ok(None);
    };
    let mut parsed = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match SymbolKind::parse(kind) {
            Some(kind) => parsed.push(kind),
            None => {
                return Err(tool_error(IndexError::InvalidInput {
                    reason: format!("unknown symbol type '{kind}'"),
                }));
            }
        }
    }
    Ok(Some(parsed))
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchClassesRequest {
    /// Pattern: empty matches all; `::Foo` exact global; `ns::Foo` suffix;
    /// otherwise case-insensitive regex on the simple name.
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub project_only: bool,
    /// Basename or path suffix of the declaring file.
    pub file_name: Option<String>,
    /// Exact namespace; empty string means global.
    pub namespace: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchFunctionsRequest {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub project_only: bool,
    /// Restrict to methods of this class (simple or qualified name).
    pub class_name: Option<String>,
    pub file_name: Option<String>,
    pub namespace: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchSymbolsRequest {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub project_only: bool,
    /// Whitelist of kinds: class, struct, class_template,
    /// partial_specialization, function, method, function_template.
    pub symbol_types: Option<Vec<String>>,
    pub namespace: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindInFileRequest {
    /// File path or glob, absolute or relative to the project root.
    pub path: String,
    /// Symbol pattern within the matched files.
    #[serde(default)]
    pub pattern: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClassNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FunctionRequest {
    pub name: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DerivedClassesRequest {
    pub base: String,
    #[serde(default)]
    pub project_only: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindCallersRequest {
    pub name: String,
    pub class_name: Option<String>,
    /// Include exact call-site locations, sorted by (file, line).
    #[serde(default)]
    pub include_call_sites: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CallPathRequest {
    pub from: String,
    pub to: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    10
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FilesContainingSymbolRequest {
    pub name: String,
    pub symbol_kind: Option<String>,
    #[serde(default)]
    pub project_only: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TypeAliasRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ParseErrorsRequest {
    pub limit: Option<usize>,
    pub path_filter: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClearErrorLogRequest {
    pub older_than_days: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IndexProjectRequest {
    #[serde(default)]
    pub force: bool,
    pub include_dependencies: Option<bool>,
}

/// MCP server wrapping one project's indexer.
#[derive(Clone)]
pub struct CppScopeServer {
    pub indexer: Arc<RwLock<CppIndexer>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CppScopeServer {
    pub fn new(indexer: CppIndexer) -> Self {
        Self {
            indexer: Arc::new(RwLock::new(indexer)),
            tool_router: Self::tool_router(),
        }
    }

    pub fn from_indexer(indexer: Arc<RwLock<CppIndexer>>) -> Self {
        Self {
            indexer,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search classes and structs by pattern. Empty pattern matches all; \
        '::Foo' matches only a global-namespace Foo; 'ns::Foo' is a qualified suffix match; \
        anything else is a case-insensitive regex against the simple name.")]
    pub async fn search_classes(
        &self,
        Parameters(req): Parameters<SearchClassesRequest>,
    ) -> CallToolResult {
        let filters = SearchFilters {
            project_only: req.project_only,
            namespace: req.namespace,
            file_name: req.file_name,
            max_results: req.max_results,
            ..Default::default()
        };
        let indexer = self.indexer.read().await;
        match indexer.search_classes(&req.pattern, &filters) {
            Ok(outcome) => tool_json(&outcome),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Search functions and methods by pattern, optionally restricted to a \
        class, a namespace, or a file.")]
    pub async fn search_functions(
        &self,
        Parameters(req): Parameters<SearchFunctionsRequest>,
    ) -> CallToolResult {
        let filters = SearchFilters {
            project_only: req.project_only,
            namespace: req.namespace,
            file_name: req.file_name,
            class_name: req.class_name,
            max_results: req.max_results,
            ..Default::default()
        };
        let indexer = self.indexer.read().await;
        match indexer.search_functions(&req.pattern, &filters) {
            Ok(outcome) => tool_json(&outcome),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Search classes and functions together; results are partitioned into \
        {classes, functions}.")]
    pub async fn search_symbols(
        &self,
        Parameters(req): Parameters<SearchSymbolsRequest>,
    ) -> CallToolResult {
        let symbol_types = match parse_kinds(&req.symbol_types) {
            Ok(kinds) => kinds,
            Err(result) => return result,
        };
        let filters = SearchFilters {
            project_only: req.project_only,
            namespace: req.namespace,
            symbol_types,
            max_results: req.max_results,
            ..Default::default()
        };
        let indexer = self.indexer.read().await;
        match indexer.search_symbols(&req.pattern, &filters) {
            Ok(outcome) => tool_json(&outcome),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "List symbols in files matching a path or glob. When nothing matches, \
        returns fuzzy path suggestions.")]
    pub async fn find_in_file(
        &self,
        Parameters(req): Parameters<FindInFileRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.find_in_file(&req.path, &req.pattern) {
            Ok(result) => tool_json(&result),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Full class record: methods, data members, base classes, direct derived \
        classes and documentation.")]
    pub async fn get_class_info(
        &self,
        Parameters(req): Parameters<ClassNameRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_class_info(&req.name) {
            Ok(info) => tool_json(&info),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Human-readable signature list for a function or method, one entry per \
        overload.")]
    pub async fn get_function_signature(
        &self,
        Parameters(req): Parameters<FunctionRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_function_signature(&req.name, req.class_name.as_deref()) {
            Ok(signatures) => tool_json(&signatures),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Direct and recursive ancestors and descendants of a class. Circular \
        references are surfaced as marked nodes.")]
    pub async fn get_class_hierarchy(
        &self,
        Parameters(req): Parameters<ClassNameRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_class_hierarchy(&req.name) {
            Ok(hierarchy) => tool_json(&hierarchy),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Classes deriving from a base, template-aware: CRTP (class D : Base<D>) \
        and inheritance through template parameters are both discovered.")]
    pub async fn get_derived_classes(
        &self,
        Parameters(req): Parameters<DerivedClassesRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_derived_classes(&req.base, req.project_only) {
            Ok(derived) => tool_json(&derived),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Functions that call the named function, optionally with exact call-site \
        locations sorted by (file, line).")]
    pub async fn find_callers(
        &self,
        Parameters(req): Parameters<FindCallersRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.find_callers(&req.name, req.class_name.as_deref(), req.include_call_sites) {
            Ok(result) => tool_json(&result),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Functions the named function calls.")]
    pub async fn find_callees(
        &self,
        Parameters(req): Parameters<FunctionRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.find_callees(&req.name, req.class_name.as_deref()) {
            Ok(result) => tool_json(&result),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Outgoing call sites of a function with exact file/line/column.")]
    pub async fn get_call_sites(
        &self,
        Parameters(req): Parameters<FunctionRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_call_sites(&req.name, req.class_name.as_deref()) {
            Ok(sites) => tool_json(&sites),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Call paths between two functions, bounded by max_depth, as lists of \
        display names.")]
    pub async fn get_call_path(
        &self,
        Parameters(req): Parameters<CallPathRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_call_path(&req.from, &req.to, req.max_depth) {
            Ok(paths) => tool_json(&paths),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Files declaring or defining a symbol, with the total reference count.")]
    pub async fn get_files_containing_symbol(
        &self,
        Parameters(req): Parameters<FilesContainingSymbolRequest>,
    ) -> CallToolResult {
        let kind = match &req.symbol_kind {
            Some(k) => match SymbolKind::parse(k) {
                Some(kind) => Some(kind),
                None => {
                    return tool_error(IndexError::InvalidInput {
                        reason: format!("unknown symbol type '{k}'"),
                    });
                }
            },
            None => None,
        };
        let indexer = self.indexer.read().await;
        match indexer.get_files_containing_symbol(&req.name, kind, req.project_only) {
            Ok(result) => tool_json(&result),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Resolve a type name or alias to its canonical type and enumerate every \
        alias pointing at it; reports ambiguity when several types match.")]
    pub async fn get_type_alias_info(
        &self,
        Parameters(req): Parameters<TypeAliasRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_type_alias_info(&req.name) {
            Ok(info) => tool_json(&info),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Recent parse errors from the developer error log.")]
    pub async fn get_parse_errors(
        &self,
        Parameters(req): Parameters<ParseErrorsRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_parse_errors(req.limit, req.path_filter.as_deref()) {
            Ok(errors) => tool_json(&errors),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Aggregate view of the parse error log.")]
    pub async fn get_error_summary(&self) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.get_error_summary() {
            Ok(summary) => tool_json(&summary),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Clear the parse error log, optionally only entries older than N days.")]
    pub async fn clear_error_log(
        &self,
        Parameters(req): Parameters<ClearErrorLogRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.clear_error_log(req.older_than_days) {
            Ok(removed) => tool_json(&serde_json::json!({ "removed": removed })),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Index the project. force=true rebuilds from scratch; otherwise cached \
        per-file results are reused.")]
    pub async fn index_project(
        &self,
        Parameters(req): Parameters<IndexProjectRequest>,
    ) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.index_project(req.force, req.include_dependencies, None) {
            Ok(stats) => tool_json(&stats),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Detect changed, new and deleted files and re-index only those.")]
    pub async fn refresh_if_needed(&self) -> CallToolResult {
        let indexer = self.indexer.read().await;
        match indexer.refresh_if_needed(None) {
            Ok(stats) => tool_json(&stats),
            Err(e) => tool_error(e),
        }
    }

    #[tool(description = "Index statistics: symbol, file and call-edge counts, plus compilation \
        database status.")]
    pub async fn get_stats(&self) -> CallToolResult {
        let indexer = self.indexer.read().await;
        let stats = indexer.get_stats();
        let compile_commands = indexer.compile_commands_stats();
        tool_json(&serde_json::json!({
            "index": stats,
            "compile_commands": compile_commands,
        }))
    }
}

#[tool_handler]
impl ServerHandler for CppScopeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("cppscope", env!("CARGO_PKG_VERSION"))
                    .with_title("cppscope C++ Code Intelligence"),
            )
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_instructions(
                "C++ code intelligence for the configured project. Start with search_classes or \
                 search_symbols to locate symbols, get_class_info / get_class_hierarchy for \
                 structure, and find_callers / find_callees / get_call_path for call-graph \
                 questions. Run index_project once, then refresh_if_needed after edits.",
            )
    }
}

/// Serve the indexer over stdio until the client disconnects.
pub async fn serve_stdio(indexer: CppIndexer) -> Result<(), Box<dyn std::error::Error>> {
    use rmcp::{ServiceExt, transport::stdio};
    let server = CppScopeServer::new(indexer);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
