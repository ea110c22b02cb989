//! `{name}` / `{name:default}` variable references in property values.
//!
//! A reference is a `{`, one or more characters other than `{`, `}` or a
//! space, and the closing `}`. Anything else is literal text, including a
//! lone brace. The first `:` in a reference separates the variable name from
//! its default; the default is used only when the variable is unset.

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Reference {
        name: &'a str,
        default: Option<&'a str>,
    },
}

/// A parsed property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> Template<'a> {
    /// Split `input` into literal and reference segments. Never fails.
    pub fn parse(input: &'a str) -> Self {
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut cursor = 0;

        while let Some(offset) = input[cursor..].find('{') {
            let open = cursor + offset;
            match reference_at(input, open) {
                Some((body, close)) => {
                    if literal_start < open {
                        segments.push(Segment::Literal(&input[literal_start..open]));
                    }
                    let (name, default) = match body.split_once(':') {
                        Some((name, default)) => (name, Some(default)),
                        None => (body, None),
                    };
                    segments.push(Segment::Reference { name, default });
                    cursor = close + 1;
                    literal_start = cursor;
                }
                None => cursor = open + 1,
            }
        }

        if literal_start < input.len() {
            segments.push(Segment::Literal(&input[literal_start..]));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    /// Whether the template contains at least one reference.
    pub fn has_references(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Reference { .. }))
    }

    /// Evaluate against `lookup`. Unset references without a default render
    /// as the empty string.
    pub fn render<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Reference { name, default } => {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                    } else if let Some(default) = default {
                        out.push_str(default);
                    }
                }
            }
        }
        out
    }
}

/// Parse and render in one step.
pub fn resolve<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    Template::parse(input).render(lookup)
}

/// If a reference starts at byte `open` (a `{`), return its body and the
/// index of the closing brace.
fn reference_at(input: &str, open: usize) -> Option<(&str, usize)> {
    let rest = &input[open + 1..];
    let end = rest.find(['{', '}', ' '])?;
    if end == 0 || !rest[end..].starts_with('}') {
        return None;
    }
    Some((&rest[..end], open + 1 + end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("flow.lifetime", "5m"),
            ("flow.debug", "true"),
            ("empty", ""),
        ])
    }

    fn lookup(name: &str) -> Option<String> {
        vars().get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_parse_segments() {
        let t = Template::parse("max {flow.lifetime} or {x:60}!");
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("max "),
                Segment::Reference {
                    name: "flow.lifetime",
                    default: None
                },
                Segment::Literal(" or "),
                Segment::Reference {
                    name: "x",
                    default: Some("60")
                },
                Segment::Literal("!"),
            ]
        );
    }

    #[test]
    fn test_render() {
        assert_eq!(resolve("{flow.lifetime}", lookup), "5m");
        assert_eq!(resolve("{missing:1h}", lookup), "1h");
        assert_eq!(resolve("{missing}", lookup), "");
        assert_eq!(resolve("a{flow.debug}b{missing}c", lookup), "atruebc");
        assert_eq!(resolve("plain", lookup), "plain");
    }

    #[test]
    fn test_default_only_applies_when_unset() {
        // A variable set to "" is still set.
        assert_eq!(resolve("{empty:fallback}", lookup), "");
    }

    #[test]
    fn test_default_keeps_later_colons() {
        assert_eq!(resolve("{missing:a:b}", lookup), "a:b");
        assert_eq!(resolve("{missing:}", lookup), "");
    }

    #[test]
    fn test_non_references_are_literal() {
        for input in ["{}", "{ flow.debug}", "{flow debug}", "{unclosed", "}", "{{x}"] {
            let t = Template::parse(input);
            if input == "{{x}" {
                assert_eq!(
                    t.segments(),
                    &[
                        Segment::Literal("{"),
                        Segment::Reference {
                            name: "x",
                            default: None
                        }
                    ]
                );
            } else {
                assert!(!t.has_references(), "{:?}", input);
                assert_eq!(t.render(lookup), input);
            }
        }
    }

    #[test]
    fn test_multibyte_literals() {
        assert_eq!(resolve("ü{flow.debug}ß", lookup), "ütrueß");
    }
}
