use bikeforge_core::specification::BikeSpecification;

const HEADER: &str =
    "Generate a photorealistic image of a custom motorcycle with these specifications:\n";

const STUDIO_SUFFIX: &str = "\n\nGenerate a high-resolution, photorealistic image on a plain white background with soft lighting, \
¾ front-left camera angle, realistic textures, and no people or brand logos. \
Include all the custom specifications mentioned above in the final image.";

/// Deterministic renderer from a finalized specification to an image prompt.
#[derive(Debug, Clone)]
pub struct ImagePromptComposer {
    max_chars: usize,
}

impl Default for ImagePromptComposer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ImagePromptComposer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Header, one `Label: value` line per populated field (catalog order,
    /// then custom fields by name) and the studio suffix. Lines that no longer
    /// fit are skipped whole so the suffix survives; shorter ones after them
    /// may still make it in.
    pub fn compose(&self, spec: &BikeSpecification) -> String {
        let mut lines = Vec::new();
        for (id, value) in spec.populated_fields() {
            lines.push(format!("\n{}: {}", id.label(), humanize_value(value)));
        }
        for (name, value) in &spec.custom_fields {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            lines.push(format!("\n{}: {}", custom_label(name), value));
        }

        let fixed = char_len(HEADER) + char_len(STUDIO_SUFFIX);
        if fixed > self.max_chars {
            let full: String = [HEADER, STUDIO_SUFFIX].concat();
            return full.chars().take(self.max_chars).collect();
        }

        let mut remaining = self.max_chars - fixed;
        let mut prompt = String::from(HEADER);
        for line in lines {
            let len = char_len(&line);
            if len > remaining {
                continue;
            }
            remaining -= len;
            prompt.push_str(&line);
        }
        prompt.push_str(STUDIO_SUFFIX);
        prompt
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// `custom_paint_job` -> `Paint Job`
fn custom_label(name: &str) -> String {
    let name = name.trim();
    title_case(name.strip_prefix("custom_").unwrap_or(name))
}

fn title_case(snake: &str) -> String {
    snake
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Option slugs such as `glossy_red` read better as `glossy red`.
fn humanize_value(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        value.to_string()
    } else {
        value.replace('_', " ")
    }
}
