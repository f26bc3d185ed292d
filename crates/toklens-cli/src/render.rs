//! Table rendering of analysis results.

use std::fmt::Write;
use tabled::builder::Builder;
use tabled::settings::Style;
use toklens_analyzer::{PromptTokens, ResourceTokens, ServerAnalysis, TokenStats, ToolTokens, TOTAL_LABEL};
use toklens_orchestrator::ServerResult;

/// Joins a server name and an item name in the cross-server detail tables.
const NAMESPACE_SEPARATOR: &str = "__";

fn table<I>(header: I, rows: Vec<Vec<String>>) -> String
where
    I: IntoIterator<Item = &'static str>,
{
    let mut builder = Builder::default();
    builder.push_record(header);
    for row in rows {
        builder.push_record(row);
    }
    builder.build().with(Style::rounded()).to_string()
}

/// `1234567` becomes `"1,234,567"`.
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Context usage line, or `None` without a limit.
pub fn context_usage(total: usize, limit: Option<usize>) -> Option<String> {
    let limit = limit.filter(|l| *l > 0)?;
    let pct = total as f64 / limit as f64 * 100.0;
    Some(format!(
        "Context Usage: {} / {} ({pct:.1}%)",
        thousands(total),
        thousands(limit)
    ))
}

fn sorted_by_total<S: TokenStats + Clone>(items: &[S]) -> Vec<S> {
    let mut items = items.to_vec();
    items.sort_by(|a, b| b.total_tokens().cmp(&a.total_tokens()));
    items
}

fn tool_row(t: &ToolTokens) -> Vec<String> {
    vec![
        t.name.clone(),
        t.name_tokens.to_string(),
        t.desc_tokens.to_string(),
        t.schema_tokens.to_string(),
        t.output_schema_tokens.to_string(),
        t.annotations_tokens.to_string(),
        t.total_tokens.to_string(),
    ]
}

fn prompt_row(p: &PromptTokens) -> Vec<String> {
    vec![
        p.name.clone(),
        p.name_tokens.to_string(),
        p.desc_tokens.to_string(),
        p.args_tokens.to_string(),
        p.total_tokens.to_string(),
    ]
}

fn resource_row(r: &ResourceTokens) -> Vec<String> {
    vec![
        r.name.clone(),
        r.name_tokens.to_string(),
        r.uri_tokens.to_string(),
        r.desc_tokens.to_string(),
        r.total_tokens.to_string(),
    ]
}

/// Item table followed by its category total, largest items first.
fn category_table<S, F>(
    title: &str,
    columns: &[&'static str],
    items: &[S],
    total: &S,
    row: F,
) -> Option<String>
where
    S: TokenStats + Clone,
    F: Fn(&S) -> Vec<String>,
{
    if items.is_empty() {
        return None;
    }
    let mut rows: Vec<Vec<String>> = sorted_by_total(items).iter().map(&row).collect();
    rows.push(row(total));
    Some(format!("{title}\n{}", table(columns.iter().copied(), rows)))
}

/// Report for a single server: instructions, one table per category and a summary.
pub fn single_server(name: &str, analysis: &ServerAnalysis, limit: Option<usize>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "MCP Server Instructions Analysis");
    let _ = writeln!(
        out,
        "{}",
        table(
            ["MCP Server Name", "Instructions Tokens"],
            vec![vec![name.to_string(), analysis.instruction_tokens.to_string()]],
        )
    );

    let sections = [
        category_table(
            "MCP Tool Analysis",
            &[
                "Tool Name",
                "Name Tokens",
                "Desc Tokens",
                "Schema Tokens",
                "Output Schema Tokens",
                "Annotation Tokens",
                "Total Tokens",
            ],
            &analysis.tools,
            &analysis.tool_total,
            tool_row,
        ),
        category_table(
            "MCP Prompt Analysis",
            &["Prompt Name", "Name Tokens", "Desc Tokens", "Args Tokens", "Total Tokens"],
            &analysis.prompts,
            &analysis.prompt_total,
            prompt_row,
        ),
        category_table(
            "MCP Resource Analysis",
            &["Resource Name", "Name Tokens", "URI Tokens", "Desc Tokens", "Total Tokens"],
            &analysis.resources,
            &analysis.resource_total,
            resource_row,
        ),
    ];
    for section in sections.into_iter().flatten() {
        let _ = writeln!(out, "\n{section}");
    }

    let total = analysis.total_tokens();
    let _ = writeln!(out, "\nSummary MCP Static Token Usage");
    let _ = writeln!(
        out,
        "{}",
        table(
            ["MCP Component", "Tokens"],
            vec![
                vec!["Instructions".into(), thousands(analysis.instruction_tokens)],
                vec!["Tools".into(), thousands(analysis.tool_total.total_tokens)],
                vec!["Prompts".into(), thousands(analysis.prompt_total.total_tokens)],
                vec!["Resources and Templates".into(), thousands(analysis.resource_total.total_tokens)],
                vec![TOTAL_LABEL.into(), thousands(total)],
            ],
        )
    );

    if let Some(usage) = context_usage(total, limit) {
        let _ = writeln!(out, "\n{usage}");
    }
    out
}

/// One row per server plus a group total. Failed servers show their error.
pub fn group_summary(results: &[ServerResult], limit: Option<usize>) -> String {
    let mut rows = Vec::with_capacity(results.len() + 1);
    let mut totals = [0usize; 5];

    for result in results {
        let Some(analysis) = result.analysis() else {
            let error = result.error().map(ToString::to_string).unwrap_or_default();
            rows.push(vec![
                result.name().to_string(),
                "ERROR".into(),
                String::new(),
                String::new(),
                String::new(),
                error,
            ]);
            continue;
        };

        let values = [
            analysis.instruction_tokens,
            analysis.tool_total.total_tokens,
            analysis.prompt_total.total_tokens,
            analysis.resource_total.total_tokens,
            analysis.total_tokens(),
        ];
        for (sum, value) in totals.iter_mut().zip(values) {
            *sum += value;
        }
        let mut row = vec![result.name().to_string()];
        row.extend(values.into_iter().map(thousands));
        rows.push(row);
    }

    let mut footer = vec!["GROUP TOTAL".to_string()];
    footer.extend(totals.into_iter().map(thousands));
    rows.push(footer);

    let mut out = String::from("Group Token Analysis Summary\n");
    out.push_str(&table(
        ["MCP Server", "Instructions", "Tools", "Prompts", "Resources", "Total Tokens"],
        rows,
    ));
    out.push('\n');
    if let Some(usage) = context_usage(totals[4], limit) {
        let _ = writeln!(out, "\n{usage}");
    }
    out
}

/// Items from every successful server, namespaced `server__item`, largest first.
fn namespaced<S, E>(results: &[ServerResult], extract: E) -> Vec<(String, String, S)>
where
    S: TokenStats + Clone,
    E: Fn(&ServerAnalysis) -> &[S],
{
    let mut items: Vec<(String, String, S)> = results
        .iter()
        .filter_map(|r| r.analysis().map(|a| (r.name(), a)))
        .flat_map(|(server, analysis)| {
            extract(analysis).iter().map(move |item| {
                (
                    server.to_string(),
                    format!("{server}{NAMESPACE_SEPARATOR}{}", item.name()),
                    item.clone(),
                )
            })
        })
        .collect();
    items.sort_by(|a, b| b.2.total_tokens().cmp(&a.2.total_tokens()));
    items
}

fn namespaced_table<S, E, F>(
    results: &[ServerResult],
    title: &str,
    columns: [&'static str; 6],
    extract: E,
    values: F,
) -> Option<String>
where
    S: TokenStats + Clone,
    E: Fn(&ServerAnalysis) -> &[S],
    F: Fn(&S) -> [usize; 4],
{
    let items = namespaced(results, extract);
    if items.is_empty() {
        return None;
    }
    let rows = items
        .iter()
        .map(|(server, name, stats)| {
            let mut row = vec![server.clone(), name.clone()];
            row.extend(values(stats).iter().map(ToString::to_string));
            row
        })
        .collect();
    Some(format!("{title}\n{}", table(columns, rows)))
}

/// Unified per-item tables across all servers.
pub fn detailed_tables(results: &[ServerResult]) -> String {
    let sections = [
        namespaced_table(
            results,
            "Unified Tool Analysis (sorted by total tokens)",
            ["Server", "Tool (Namespaced)", "Name", "Desc", "Schema", "Total"],
            |a| a.tools.as_slice(),
            |t: &ToolTokens| {
                [
                    t.name_tokens,
                    t.desc_tokens,
                    t.schema_tokens + t.output_schema_tokens + t.annotations_tokens,
                    t.total_tokens,
                ]
            },
        ),
        namespaced_table(
            results,
            "Unified Prompt Analysis (sorted by total tokens)",
            ["Server", "Prompt (Namespaced)", "Name", "Desc", "Args", "Total"],
            |a| a.prompts.as_slice(),
            |p: &PromptTokens| [p.name_tokens, p.desc_tokens, p.args_tokens, p.total_tokens],
        ),
        namespaced_table(
            results,
            "Unified Resource Analysis (sorted by total tokens)",
            ["Server", "Resource (Namespaced)", "Name", "URI", "Desc", "Total"],
            |a| a.resources.as_slice(),
            |r: &ResourceTokens| [r.name_tokens, r.uri_tokens, r.desc_tokens, r.total_tokens],
        ),
    ];

    let mut out = String::new();
    for section in sections.into_iter().flatten() {
        let _ = writeln!(out, "\n{section}");
    }
    out
}
