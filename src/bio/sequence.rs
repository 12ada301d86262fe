use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub description: Option<String>,
    pub sequence: Vec<u8>,
}

impl Sequence {
    pub fn new(id: String, sequence: Vec<u8>) -> Self {
        Self {
            id,
            description: None,
            sequence,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Sites that are neither an unambiguous nucleotide nor an alignment gap.
    pub fn count_ambiguous(&self) -> usize {
        self.sequence
            .iter()
            .filter(|c| !matches!(c.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'-'))
            .count()
    }

    pub fn count_n(&self) -> usize {
        self.sequence
            .iter()
            .filter(|c| c.eq_ignore_ascii_case(&b'N'))
            .count()
    }

    pub fn count_gaps(&self) -> usize {
        self.sequence.iter().filter(|&&c| c == b'-').count()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.sequence))
    }
}
