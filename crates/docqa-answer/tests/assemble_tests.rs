use docqa_answer::{build_citations, build_context, referenced_markers, render_context};
use docqa_core::types::{Chunk, FusedResult};

fn fused(id: &str, text: &str, rank: usize) -> FusedResult {
    FusedResult {
        chunk: Chunk {
            id: id.to_string(),
            doc_id: format!("doc-{id}"),
            source: format!("{id}.pdf"),
            ordinal: 0,
            text: text.to_string(),
            page: 2,
            page_end: if id == "c" { 3 } else { 2 },
            start: 0,
            end: text.len(),
        },
        score: 1.0 / rank as f32,
        rank,
    }
}

fn results() -> Vec<FusedResult> {
    vec![fused("a", "aaaaaaaaaa", 1), fused("b", "bbbbbbbbbb", 2), fused("c", "cccccccccc", 3)]
}

#[test]
fn context_respects_character_budget() {
    let context = build_context(&results(), 25);
    assert_eq!(context.len(), 2);
    assert_eq!(context.iter().map(|c| c.marker).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(context[1].chunk.id, "b");

    let all = build_context(&results(), 30);
    assert_eq!(all.len(), 3);
}

#[test]
fn oversized_first_chunk_is_truncated_not_dropped() {
    let context = build_context(&results(), 4);
    assert_eq!(context.len(), 1);
    assert_eq!(context[0].text, "aaaa");
    assert_eq!(context[0].chunk.text, "aaaaaaaaaa");
    assert!(build_context(&[], 100).is_empty());
}

#[test]
fn rendered_context_carries_markers_and_pages() {
    let rendered = render_context(&build_context(&results(), 100));
    assert!(rendered.starts_with("[1] (a.pdf, p. 2)\naaaaaaaaaa"));
    assert!(rendered.contains("[3] (c.pdf, pp. 2-3)"));
}

#[test]
fn markers_are_parsed_in_order_of_appearance() {
    let answer =
        "Store water in tanks [2]. Filters help [1, 3][2]. Not a marker: [a], [], [9], [0].";
    assert_eq!(referenced_markers(answer, 4), vec![2, 1, 3]);
    assert_eq!(referenced_markers("nested [[4]] works", 4), vec![4]);
    assert!(referenced_markers("no citations here", 4).is_empty());
}

#[test]
fn citations_map_markers_back_to_chunks() {
    let context = build_context(&results(), 100);
    let citations = build_citations("Use c [3] before a [1].", &context);
    assert_eq!(citations.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(), vec!["c", "a"]);
    assert_eq!(citations[0].marker, 3);
    assert_eq!(citations[0].page_end, 3);
    assert_eq!(citations[1].source, "a.pdf");
    assert_eq!(citations[1].snippet, "aaaaaaaaaa");
}

#[test]
fn uncited_answer_cites_the_whole_context() {
    let context = build_context(&results(), 100);
    let citations = build_citations("An answer without markers.", &context);
    assert_eq!(citations.len(), 3);
    assert!(build_citations("anything [1]", &[]).is_empty());
}

#[test]
fn long_snippets_are_shortened() {
    let long = "word ".repeat(100);
    let context = build_context(&[fused("a", &long, 1)], 1_000);
    let citation = &build_citations("[1]", &context)[0];
    assert_eq!(citation.snippet.chars().count(), 161);
    assert!(citation.snippet.ends_with('…'));
}
