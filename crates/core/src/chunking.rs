use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        let config = Self {
            max_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    /// Distance the window start moves between chunks.
    pub fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Line breaks become spaces and the ends are trimmed; inner spacing is kept.
pub fn normalize_newlines(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Splits `text` into fixed windows of `max_chars` characters, each starting
/// `max_chars - overlap_chars` after the previous one. The final window may be
/// shorter and always ends at the end of the text.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let normalized = normalize_newlines(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut chunks = Vec::with_capacity(chars.len() / config.stride() + 1);

    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    Ok(chunks)
}
