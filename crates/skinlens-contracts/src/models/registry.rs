use indexmap::IndexMap;

pub const VISION_CAPABILITY: &str = "vision";

/// Model used when neither `--model` nor `SKINLENS_MODEL` names one.
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
    pub description: String,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    // First vision-capable entry is the fallback default.
    let mut insert = |name: &str,
                      capabilities: &[&str],
                      context_window: Option<u64>,
                      description: &str| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
                description: description.to_string(),
            },
        );
    };

    insert(
        DEFAULT_VISION_MODEL,
        &["text", "vision"],
        Some(1_048_576),
        "fast multimodal model, good default for skin scans",
    );
    insert(
        "gemini-2.5-pro",
        &["text", "vision"],
        Some(1_048_576),
        "slower, more thorough reasoning over fine skin detail",
    );
    insert(
        "gemini-3-pro-preview",
        &["text", "vision"],
        Some(1_048_576),
        "preview model; output format may drift",
    );
    insert(
        "gemini-2.5-flash-lite",
        &["text", "vision"],
        Some(1_048_576),
        "lowest latency, coarser assessments",
    );
    insert(
        "gemini-2.0-flash",
        &["text", "vision"],
        Some(1_048_576),
        "previous generation flash model",
    );
    insert(
        "gemini-2.5-flash-image",
        &["image"],
        None,
        "image generation only; cannot analyze photos",
    );

    map
}
