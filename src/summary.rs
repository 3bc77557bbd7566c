//! LLM post passes over the finished tree: per-node summaries and a
//! one-sentence document description.

use crate::error::{ExtractError, Result};
use crate::llm::{LlmClient, Prompts};
use crate::tree::TreeNode;
use futures::future::join_all;
use tracing::warn;

/// Generate a summary for every node, concurrently. Nodes must carry their
/// page text (see [`crate::tree::attach_node_text`]); a node whose summary
/// call fails is left without one.
pub async fn generate_summaries(client: &LlmClient, nodes: &mut [TreeNode]) {
    fn collect_texts(nodes: &[TreeNode], out: &mut Vec<String>) {
        for node in nodes {
            out.push(node.text.clone().unwrap_or_default());
            collect_texts(&node.nodes, out);
        }
    }

    let mut texts = Vec::new();
    collect_texts(nodes, &mut texts);

    let tasks = texts.iter().map(|text| async move {
        let prompt = Prompts::generate_node_summary().replace("{content}", text);
        client.complete(None, &prompt).await
    });
    let results = join_all(tasks).await;

    fn assign(nodes: &mut [TreeNode], results: &mut std::vec::IntoIter<Result<String>>) {
        for node in nodes {
            match results.next() {
                Some(Ok(summary)) => node.summary = Some(summary),
                Some(Err(e)) => {
                    warn!(title = %node.title, error = %e, "summary generation failed")
                }
                None => return,
            }
            assign(&mut node.nodes, results);
        }
    }

    assign(nodes, &mut results.into_iter());
}

/// Generate a one-sentence description of the whole document from its
/// structure (summaries included when present).
pub async fn generate_doc_description(client: &LlmClient, nodes: &[TreeNode]) -> Result<String> {
    let structure_json = serde_json::to_string_pretty(nodes)
        .map_err(|e| ExtractError::Serialization(e.to_string()))?;
    let prompt = Prompts::generate_doc_description().replace("{structure}", &structure_json);
    client.complete(None, &prompt).await
}
