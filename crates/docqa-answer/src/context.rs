use docqa_core::types::{ContextChunk, FusedResult};

/// Number the fused results `[1]..[m]` in rank order, keeping the total text
/// within `max_chars`. The first result is always present, cut to the budget
/// if it alone exceeds it; later results are added while they fit.
pub fn build_context(results: &[FusedResult], max_chars: usize) -> Vec<ContextChunk> {
    let mut context = Vec::new();
    let mut used = 0usize;
    for result in results {
        let len = result.chunk.text.chars().count();
        let text = if context.is_empty() && len > max_chars {
            result.chunk.text.chars().take(max_chars).collect()
        } else if used + len <= max_chars {
            result.chunk.text.clone()
        } else {
            break;
        };
        used += text.chars().count();
        context.push(ContextChunk { marker: context.len() + 1, chunk: result.chunk.clone(), text });
    }
    context
}

/// Plain-text rendering handed to the language model.
pub fn render_context(context: &[ContextChunk]) -> String {
    context
        .iter()
        .map(|c| {
            let pages = if c.chunk.page == c.chunk.page_end {
                format!("p. {}", c.chunk.page)
            } else {
                format!("pp. {}-{}", c.chunk.page, c.chunk.page_end)
            };
            format!("[{}] ({}, {})\n{}", c.marker, c.chunk.source, pages, c.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
