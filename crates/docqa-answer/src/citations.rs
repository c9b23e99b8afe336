use docqa_core::types::{Citation, ContextChunk};

const SNIPPET_CHARS: usize = 160;

/// Markers cited in `answer` (`[2]`, `[1, 3]`, `[1][4]`), in order of first
/// appearance, deduplicated, restricted to `1..=max`.
pub fn referenced_markers(answer: &str, max: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = answer;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        let inner = &after[..close];
        let is_marker = inner.chars().all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace());
        if !inner.trim().is_empty() && is_marker {
            for n in inner.split(',').filter_map(|p| p.trim().parse::<usize>().ok()) {
                if (1..=max).contains(&n) && !found.contains(&n) {
                    found.push(n);
                }
            }
            rest = &after[close + 1..];
        } else {
            rest = after;
        }
    }
    found
}

/// Map the markers referenced in `answer` back to their chunks. An answer
/// that references none cites the whole context.
pub fn build_citations(answer: &str, context: &[ContextChunk]) -> Vec<Citation> {
    let markers = referenced_markers(answer, context.len());
    let cited: Vec<&ContextChunk> = if markers.is_empty() {
        context.iter().collect()
    } else {
        markers.iter().filter_map(|m| context.get(m - 1)).collect()
    };
    cited.into_iter().map(citation).collect()
}

fn citation(c: &ContextChunk) -> Citation {
    let mut snippet: String = c.chunk.text.trim().chars().take(SNIPPET_CHARS).collect();
    if c.chunk.text.trim().chars().count() > SNIPPET_CHARS {
        snippet.push('…');
    }
    Citation {
        marker: c.marker,
        chunk_id: c.chunk.id.clone(),
        doc_id: c.chunk.doc_id.clone(),
        source: c.chunk.source.clone(),
        page: c.chunk.page,
        page_end: c.chunk.page_end,
        snippet,
    }
}
