//! # Text Features - Turning Passages into Vectors and Concepts
//!
//! The archive never understands text. It hashes tokens into a fixed-length
//! vector and pattern-matches them against a closed table of concept
//! categories. Two passages are "close" when their vectors point the same
//! way and their concept tags overlap.
//!
//! ## Pipeline
//!
//! 1. `tokenize`: lowercase, split on anything not alphanumeric
//! 2. drop stopwords (English and Spanish) and tokens shorter than 3 chars
//! 3. `concepts_for`: match tokens against the concept table
//! 4. `vectorize`: signed feature hashing into `dims` buckets, L2-normalised

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Words carrying no signal
pub const STOPWORDS: &[&str] = &[
    // English
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "who", "did", "yes", "too", "use",
    "that", "this", "with", "from", "they", "will", "would", "there", "their", "what", "about",
    "which", "when", "were", "been", "have", "into", "than", "then", "them", "these", "some",
    "your", "also", "just", "only", "over", "such", "very", "more", "most", "other",
    // Spanish
    "que", "los", "las", "del", "por", "una", "con", "para", "como", "pero", "sus", "les",
    "este", "esta", "esto", "entre", "cuando", "muy", "sin", "sobre", "también", "hasta",
    "donde", "quien", "desde", "todo", "nos", "durante", "todos", "uno", "ese", "eso",
];

/// Closed table of concept categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Concept {
    Consciousness,
    Nature,
    Time,
    Language,
    Emotion,
    Body,
    Cosmos,
    Technology,
}

impl Concept {
    pub const ALL: [Concept; 8] = [
        Concept::Consciousness,
        Concept::Nature,
        Concept::Time,
        Concept::Language,
        Concept::Emotion,
        Concept::Body,
        Concept::Cosmos,
        Concept::Technology,
    ];

    /// Token prefixes that evoke this concept
    pub fn stems(&self) -> &'static [&'static str] {
        match self {
            Concept::Consciousness => &["mind", "conscious", "thought", "think", "aware", "dream", "soul", "mente", "concien", "pensa", "sueñ", "alma"],
            Concept::Nature => &["tree", "forest", "root", "river", "sea", "flower", "leaf", "fung", "mycel", "árbol", "bosque", "raíz", "río", "mar", "flor", "hoja", "hongo", "micel"],
            Concept::Time => &["time", "moment", "eternal", "memor", "past", "future", "hour", "tiempo", "momento", "etern", "pasado", "futuro", "hora"],
            Concept::Language => &["word", "poem", "poet", "verse", "language", "voice", "speak", "palabra", "poema", "poeta", "verso", "lengua", "voz"],
            Concept::Emotion => &["love", "fear", "joy", "sorrow", "grief", "hope", "desire", "amor", "miedo", "alegr", "tristeza", "esperanza", "deseo"],
            Concept::Body => &["body", "skin", "blood", "heart", "breath", "hand", "cuerpo", "piel", "sangre", "corazón", "aliento", "mano"],
            Concept::Cosmos => &["star", "light", "cosmos", "universe", "sky", "void", "estrella", "luz", "universo", "cielo", "vacío"],
            Concept::Technology => &["machine", "code", "network", "signal", "algorithm", "digital", "máquina", "código", "red", "señal", "algoritmo"],
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Concept::Consciousness => "consciousness",
            Concept::Nature => "nature",
            Concept::Time => "time",
            Concept::Language => "language",
            Concept::Emotion => "emotion",
            Concept::Body => "body",
            Concept::Cosmos => "cosmos",
            Concept::Technology => "technology",
        };
        write!(f, "{}", name)
    }
}

/// Lowercase tokens without stopwords or very short words
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Concept tags evoked by a token list
pub fn concepts_for(tokens: &[String]) -> BTreeSet<Concept> {
    let mut tags = BTreeSet::new();
    for token in tokens {
        for concept in Concept::ALL {
            if concept.stems().iter().any(|stem| token.starts_with(stem)) {
                tags.insert(concept);
            }
        }
    }
    tags
}

/// Signed feature hashing into `dims` buckets, L2-normalised
///
/// Empty input (or `dims == 0`) yields the zero vector.
///
/// Buckets come from `DefaultHasher`, whose output may change between Rust
/// releases. Vectors are only valid within one process and must not be
/// persisted or compared across builds.
pub fn vectorize(tokens: &[String], dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    if dims == 0 {
        return vector;
    }

    for token in tokens {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();

        let bucket = (hash % dims as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    normalize(&mut vector);
    vector
}

/// Scale to unit length (zero vectors are left untouched)
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for v in vector.iter_mut() {
            *v /= magnitude;
        }
    }
}

/// Cosine similarity, guarded
///
/// Returns exactly 0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 && denom.is_finite() {
        (dot / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Jaccard overlap of two tag sets (0 when both are empty)
pub fn tag_overlap(a: &BTreeSet<Concept>, b: &BTreeSet<Concept>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
