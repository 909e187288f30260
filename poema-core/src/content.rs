//! # Content Table - Static Flavor Text
//!
//! Kernels narrate with short templated lines. Templates may mention
//! `{subject}` (an entity label or id) and `{value}` (a number, two decimals).
//! Rendering never fails: anything that is not one of those two placeholders
//! is left as-is, and an empty category yields [`DEFAULT_LINE`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;

/// Line used when a category has no templates
pub const DEFAULT_LINE: &str = "the system murmurs";

/// Template categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Autopoietic process events
    Process,
    /// Component events of the autopoietic system
    System,
    /// Memory and evolution events of the core
    Core,
    /// Agent dialogue lines
    Dialogue,
    /// Micelio network events
    Micelio,
    /// Seed text used when nothing could be fetched
    Seed,
    /// Relay replies used when the upstream is unreachable
    RelayFallback,
}

const PROCESS: &[&str] = &[
    "{subject} folds its membrane inward ({value})",
    "{subject} reproduces the boundary that produces it",
    "a closed loop tightens around {subject}",
    "{subject} metabolises noise into structure ({value})",
];

const SYSTEM: &[&str] = &[
    "{subject} couples with its neighbours ({value})",
    "component {subject} rewrites its own interface",
    "the organisation holds while {subject} changes",
];

const CORE: &[&str] = &[
    "{subject} stores a trace: {value}",
    "memory node {subject} consolidates",
    "{subject} evolves towards coherence {value}",
    "an old pattern resurfaces in {subject}",
];

const DIALOGUE: &[&str] = &[
    "{subject}: what remains of a word once it is spoken?",
    "{subject} answers with a question",
    "{subject}: I heard the others at {value}",
    "{subject} proposes a new metaphor",
    "{subject} disagrees, softly",
];

const MICELIO: &[&str] = &[
    "hypha {subject} reaches a new post ({value})",
    "{subject} shares nutrients with a distant node",
    "spores from {subject} drift through the feed",
    "{subject} resonates at {value}",
];

const SEED: &[&str] = &[
    "The forest remembers every root it ever lost.",
    "A word is a small machine for making silence audible.",
    "We are the dream the river has of the sea.",
    "Light travels for centuries to touch a single leaf.",
    "La memoria es un bosque donde la luz llega tarde.",
    "Every signal carries the shape of the hand that sent it.",
];

const RELAY_FALLBACK: &[&str] = &[
    "The network is quiet. I answer from memory: the roots still speak.",
    "No voice reached me, so I listen to the hum of the machine.",
    "Silence is also a reply. Ask again when the light returns.",
];

/// Static templates per category
#[derive(Clone, Debug)]
pub struct RandomContentTable {
    templates: BTreeMap<ContentCategory, &'static [&'static str]>,
}

impl Default for RandomContentTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RandomContentTable {
    /// Table with the built-in templates for every category
    pub fn builtin() -> Self {
        Self::empty()
            .with_templates(ContentCategory::Process, PROCESS)
            .with_templates(ContentCategory::System, SYSTEM)
            .with_templates(ContentCategory::Core, CORE)
            .with_templates(ContentCategory::Dialogue, DIALOGUE)
            .with_templates(ContentCategory::Micelio, MICELIO)
            .with_templates(ContentCategory::Seed, SEED)
            .with_templates(ContentCategory::RelayFallback, RELAY_FALLBACK)
    }

    /// Table without any templates (every render yields the default line)
    pub fn empty() -> Self {
        Self { templates: BTreeMap::new() }
    }

    /// Builder: replace the templates of one category
    pub fn with_templates(mut self, category: ContentCategory, templates: &'static [&'static str]) -> Self {
        self.templates.insert(category, templates);
        self
    }

    /// Number of templates in a category
    pub fn len(&self, category: ContentCategory) -> usize {
        self.templates.get(&category).map_or(0, |t| t.len())
    }

    /// Raw template chosen at random (default line when empty)
    pub fn pick(&self, category: ContentCategory, rng: &mut dyn RandomSource) -> &'static str {
        match self.templates.get(&category) {
            Some(templates) if !templates.is_empty() => templates[rng.index(templates.len())],
            _ => DEFAULT_LINE,
        }
    }

    /// Render a random template with `subject` and `value` filled in
    pub fn render(
        &self,
        category: ContentCategory,
        subject: &str,
        value: f32,
        rng: &mut dyn RandomSource,
    ) -> String {
        let template = self.pick(category, rng);
        let value = if value.is_finite() { format!("{:.2}", value) } else { "0.00".to_string() };
        template.replace("{subject}", subject).replace("{value}", &value)
    }
}
