use crate::RetrievalHit;

pub const CONTEXT_DELIMITER: &str = "\n\n---\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextStyle {
    /// Chunk texts only.
    #[default]
    Plain,
    /// One labelled block per hit with the document's structured fields.
    Structured,
}

pub fn render_contexts(hits: &[RetrievalHit], style: ContextStyle) -> String {
    let blocks: Vec<String> = match style {
        ContextStyle::Plain => hits.iter().map(|hit| hit.text.clone()).collect(),
        ContextStyle::Structured => hits
            .iter()
            .enumerate()
            .map(|(position, hit)| structured_block(position + 1, hit))
            .collect(),
    };
    blocks.join(CONTEXT_DELIMITER)
}

fn structured_block(number: usize, hit: &RetrievalHit) -> String {
    let mut lines = vec![format!("Source {number}: {}", hit.title)];

    if let Some(summary) = non_empty(hit.summary.as_deref()) {
        lines.push(format!("Summary: {summary}"));
    }
    if !hit.key_points.is_empty() {
        lines.push(format!("Key points: {}", hit.key_points.join("; ")));
    }
    if !hit.locations.is_empty() {
        lines.push(format!("Locations: {}", hit.locations.join(", ")));
    }
    if !hit.people.is_empty() {
        lines.push(format!("People: {}", hit.people.join(", ")));
    }
    if let Some(date) = non_empty(hit.date.as_deref()) {
        lines.push(format!("Date: {date}"));
    }
    lines.push(format!("Detail: {}", hit.text));

    lines.join("\n")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Grounding prompt for `question` over `hits`. Pure: identical input gives identical output.
pub fn build_prompt(question: &str, hits: &[RetrievalHit], style: ContextStyle) -> String {
    let context = render_contexts(hits, style);
    format!(
        "You are a highly accurate historian specialized in World War II.\n\
         Answer the question ONLY using the information from the CONTEXT.\n\
         If the answer is not present, say you don't know and suggest what to search.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {question}\n\
         \n\
         Provide a clear answer (4-8 sentences). Do NOT invent information."
    )
}
