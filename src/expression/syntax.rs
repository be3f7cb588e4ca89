//! Macro pattern tables.
//!
//! A [`Syntax`] is an ordered list of [`MacroPattern`]s combined into one
//! alternation. Order is the tie-break: when two patterns could match at the
//! same position, the earlier one wins, both in the regex (leftmost-first
//! alternation) and in [`Syntax::classify`], which picks the first pattern
//! whose required captures are all present.
//!
//! Capture group names are unique per [`MacroTag`], so a table may use each
//! tag at most once.

use super::{Guard, MacroKind};
use crate::variables::Value;
use regex::{Captures, Regex};
use std::sync::LazyLock;

const PATH: &str = r"[A-Za-z0-9_\-\\/.]+";
const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";
const IMAGE_EXT: &str = r"(?:png|jpe?g|gif|svg|webp|ico)";
const OPERAND: &str = r#"-?[0-9]+(?:\.[0-9]+)?|"[^"\n]*"|[A-Za-z_][A-Za-z0-9_]*"#;

/// The macro a pattern produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroTag {
    Include,
    IncludeEscaped,
    StylesheetUrl,
    ScriptUrl,
    ImageUrl,
    ImagePath,
    ResourceUrl,
    AppConf,
    Translate,
    Declare,
    Display,
    If,
    Else,
    End,
}

impl MacroTag {
    /// Capture groups that must be present for a match to be this macro.
    fn required(self) -> &'static [&'static str] {
        match self {
            MacroTag::Include => &["inc_path"],
            MacroTag::IncludeEscaped => &["esc_path"],
            MacroTag::StylesheetUrl => &["css_url"],
            MacroTag::ScriptUrl => &["js_url"],
            MacroTag::ImageUrl => &["img_url"],
            MacroTag::ImagePath => &["img_path"],
            MacroTag::ResourceUrl => &["res_key"],
            MacroTag::AppConf => &["conf_key", "conf_filter"],
            MacroTag::Translate => &["i18n_key"],
            MacroTag::Declare => &["set_name", "set_value"],
            MacroTag::Display => &["show_name"],
            MacroTag::If => &["if_left"],
            MacroTag::Else => &["else_tag"],
            MacroTag::End => &["end_tag"],
        }
    }

    fn build(self, caps: &Captures<'_>) -> Option<MacroKind> {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        let kind = match self {
            MacroTag::Include => MacroKind::Include {
                path: group("inc_path")?,
                escaped: false,
            },
            MacroTag::IncludeEscaped => MacroKind::Include {
                path: group("esc_path")?,
                escaped: true,
            },
            MacroTag::StylesheetUrl => MacroKind::StylesheetUrl {
                path: group("css_url")?,
            },
            MacroTag::ScriptUrl => MacroKind::ScriptUrl {
                path: group("js_url")?,
            },
            MacroTag::ImageUrl => MacroKind::ImageUrl {
                path: group("img_url")?,
            },
            MacroTag::ImagePath => MacroKind::ImagePath {
                path: group("img_path")?,
            },
            MacroTag::ResourceUrl => MacroKind::ResourceUrl {
                key: group("res_key")?,
            },
            MacroTag::AppConf => MacroKind::AppConf {
                key: group("conf_key")?,
                filter: group("conf_filter")?,
            },
            MacroTag::Translate => MacroKind::Translate {
                key: group("i18n_key")?,
            },
            MacroTag::Declare => MacroKind::Declare {
                name: group("set_name")?,
                value: Value::parse(&group("set_value")?),
            },
            MacroTag::Display => MacroKind::Display {
                name: group("show_name")?,
            },
            MacroTag::If => {
                let left = Value::parse(&group("if_left")?);
                let guard = match (group("if_op").as_deref(), group("if_right")) {
                    (Some("=="), Some(right)) => Guard::Equals(left, Value::parse(&right)),
                    (Some("!="), Some(right)) => Guard::NotEquals(left, Value::parse(&right)),
                    _ => Guard::Truthy(left),
                };
                MacroKind::If(guard)
            }
            MacroTag::Else => MacroKind::Else,
            MacroTag::End => MacroKind::End,
        };
        Some(kind)
    }
}

/// One entry of a syntax table.
#[derive(Debug, Clone)]
pub struct MacroPattern {
    pub tag: MacroTag,
    pub regex: String,
}

impl MacroPattern {
    pub fn new(tag: MacroTag, regex: impl Into<String>) -> Self {
        Self {
            tag,
            regex: regex.into(),
        }
    }
}

/// An ordered, compiled macro table.
#[derive(Debug)]
pub struct Syntax {
    patterns: Vec<MacroPattern>,
    combined: Regex,
}

impl Syntax {
    /// Compile `patterns` into a single alternation, keeping their order.
    pub fn new(patterns: Vec<MacroPattern>) -> Result<Self, regex::Error> {
        let alternation = patterns
            .iter()
            .map(|p| format!("(?:{})", p.regex))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            combined: Regex::new(&alternation)?,
            patterns,
        })
    }

    /// Macro table for markup assets.
    pub fn markup() -> &'static Syntax {
        static MARKUP: LazyLock<Syntax> = LazyLock::new(|| {
            let mut patterns = vec![
                MacroPattern::new(
                    MacroTag::Include,
                    format!(r"\[%= include (?P<inc_path>{PATH}) %\]"),
                ),
                MacroPattern::new(
                    MacroTag::IncludeEscaped,
                    format!(r"\[%= include_escaped (?P<esc_path>{PATH}) %\]"),
                ),
                stylesheet_url(),
                script_url(),
                image_url(),
                resource_url(),
                app_conf(),
            ];
            patterns.extend(control_flow());
            patterns.push(MacroPattern::new(
                MacroTag::Translate,
                r"\[ (?P<i18n_key>[A-Za-z0-9_.\-]+(?: [A-Za-z0-9_.\-]+)*) \]",
            ));
            Syntax::new(patterns).expect("markup macro patterns must compile")
        });
        &MARKUP
    }

    /// Macro table for stylesheet assets.
    pub fn stylesheet() -> &'static Syntax {
        static STYLESHEET: LazyLock<Syntax> = LazyLock::new(|| {
            let mut patterns = vec![
                MacroPattern::new(
                    MacroTag::Include,
                    format!(r"/\*= include (?P<inc_path>{PATH}\.(?:css|scss|sass)) \*/"),
                ),
                image_url(),
                MacroPattern::new(
                    MacroTag::ImagePath,
                    format!(r#"\[%= image_path "(?P<img_path>{PATH}\.{IMAGE_EXT})" %\]"#),
                ),
                resource_url(),
            ];
            patterns.extend(control_flow());
            Syntax::new(patterns).expect("stylesheet macro patterns must compile")
        });
        &STYLESHEET
    }

    /// Macro table for script assets.
    pub fn script() -> &'static Syntax {
        static SCRIPT: LazyLock<Syntax> = LazyLock::new(|| {
            let mut patterns = vec![
                MacroPattern::new(
                    MacroTag::Include,
                    format!(r#"\[%= include "(?P<inc_path>{PATH}\.(?:js|coffee))" %\]"#),
                ),
                script_url(),
                image_url(),
                resource_url(),
                app_conf(),
            ];
            patterns.extend(control_flow());
            Syntax::new(patterns).expect("script macro patterns must compile")
        });
        &SCRIPT
    }

    /// Combined alternation regex.
    pub fn regex(&self) -> &Regex {
        &self.combined
    }

    /// Classify a match of [`Self::regex`].
    ///
    /// Returns the macro built by the first pattern, in table order, whose
    /// required captures are all present.
    pub fn classify(&self, caps: &Captures<'_>) -> Option<MacroKind> {
        self.patterns
            .iter()
            .find(|p| p.tag.required().iter().all(|g| caps.name(g).is_some()))
            .and_then(|p| p.tag.build(caps))
    }
}

fn stylesheet_url() -> MacroPattern {
    MacroPattern::new(
        MacroTag::StylesheetUrl,
        format!(r"\[%= stylesheet_url (?P<css_url>{PATH}\.(?:css|scss|sass)) %\]"),
    )
}

fn script_url() -> MacroPattern {
    MacroPattern::new(
        MacroTag::ScriptUrl,
        format!(r"\[%= script_url (?P<js_url>{PATH}\.(?:js|coffee)) %\]"),
    )
}

fn image_url() -> MacroPattern {
    MacroPattern::new(
        MacroTag::ImageUrl,
        format!(r"\[%= image_url (?P<img_url>{PATH}\.{IMAGE_EXT}) %\]"),
    )
}

fn resource_url() -> MacroPattern {
    MacroPattern::new(
        MacroTag::ResourceUrl,
        r"\[%= resource_url (?P<res_key>[A-Za-z0-9_\-]+(?:/[A-Za-z0-9_\-]+)*) %\]",
    )
}

fn app_conf() -> MacroPattern {
    MacroPattern::new(
        MacroTag::AppConf,
        r"\[!(?P<conf_key>[A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)!(?P<conf_filter>[A-Za-z0-9_\-]{0,25})\]",
    )
}

/// Variable and conditional macros, shared by every text syntax.
///
/// Display comes last so `[%= include x %]`-style macros declared earlier
/// keep priority over the generic `[%= name %]` form.
fn control_flow() -> Vec<MacroPattern> {
    vec![
        MacroPattern::new(
            MacroTag::Declare,
            format!(r"\[% set (?P<set_name>{IDENT}) = (?P<set_value>{OPERAND}) %\]"),
        ),
        MacroPattern::new(
            MacroTag::If,
            format!(
                r"\[% if (?P<if_left>{OPERAND})(?: (?P<if_op>==|!=) (?P<if_right>{OPERAND}))? %\]"
            ),
        ),
        MacroPattern::new(MacroTag::Else, r"(?P<else_tag>\[% else %\])"),
        MacroPattern::new(MacroTag::End, r"(?P<end_tag>\[% end %\])"),
        MacroPattern::new(
            MacroTag::Display,
            format!(r"\[%= (?P<show_name>{IDENT}) %\]"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(syntax: &Syntax, text: &str) -> Vec<MacroKind> {
        syntax
            .regex()
            .captures_iter(text)
            .filter_map(|c| syntax.classify(&c))
            .collect()
    }

    #[test]
    fn builtin_tables_compile() {
        let _ = Syntax::markup();
        let _ = Syntax::stylesheet();
        let _ = Syntax::script();
    }

    #[test]
    fn markup_include_beats_display() {
        let found = kinds(Syntax::markup(), "[%= include footer %]");
        assert_eq!(
            found,
            vec![MacroKind::Include {
                path: "footer".into(),
                escaped: false
            }]
        );
    }

    #[test]
    fn markup_escaped_include() {
        let found = kinds(Syntax::markup(), "[%= include_escaped snippet %]");
        assert_eq!(
            found,
            vec![MacroKind::Include {
                path: "snippet".into(),
                escaped: true
            }]
        );
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let display_first = Syntax::new(vec![
            MacroPattern::new(MacroTag::Display, r"\[%= (?P<show_name>\w+) %\]"),
            MacroPattern::new(MacroTag::Include, r"\[%= (?P<inc_path>\w+) %\]"),
        ])
        .unwrap();
        let include_first = Syntax::new(vec![
            MacroPattern::new(MacroTag::Include, r"\[%= (?P<inc_path>\w+) %\]"),
            MacroPattern::new(MacroTag::Display, r"\[%= (?P<show_name>\w+) %\]"),
        ])
        .unwrap();

        assert_eq!(
            kinds(&display_first, "[%= footer %]"),
            vec![MacroKind::Display {
                name: "footer".into()
            }]
        );
        assert_eq!(
            kinds(&include_first, "[%= footer %]"),
            vec![MacroKind::Include {
                path: "footer".into(),
                escaped: false
            }]
        );
    }

    #[test]
    fn app_conf_with_and_without_filter() {
        let found = kinds(Syntax::markup(), "[!site.name!] [!site.menu!json]");
        assert_eq!(
            found,
            vec![
                MacroKind::AppConf {
                    key: "site.name".into(),
                    filter: String::new()
                },
                MacroKind::AppConf {
                    key: "site.menu".into(),
                    filter: "json".into()
                },
            ]
        );
    }

    #[test]
    fn binary_guards() {
        let found = kinds(
            Syntax::markup(),
            r#"[% if theme == "dark" %][% if n != 3 %][% if flag %]"#,
        );
        assert_eq!(
            found,
            vec![
                MacroKind::If(Guard::Equals(
                    Value::Alias("theme".into()),
                    Value::Str("dark".into())
                )),
                MacroKind::If(Guard::NotEquals(
                    Value::Alias("n".into()),
                    Value::Number(3.0)
                )),
                MacroKind::If(Guard::Truthy(Value::Alias("flag".into()))),
            ]
        );
    }

    #[test]
    fn declare_literals_and_alias() {
        let found = kinds(
            Syntax::script(),
            r#"[% set a = 1 %][% set b = "x" %][% set c = a %]"#,
        );
        assert_eq!(
            found,
            vec![
                MacroKind::Declare {
                    name: "a".into(),
                    value: Value::Number(1.0)
                },
                MacroKind::Declare {
                    name: "b".into(),
                    value: Value::Str("x".into())
                },
                MacroKind::Declare {
                    name: "c".into(),
                    value: Value::Alias("a".into())
                },
            ]
        );
    }

    #[test]
    fn stylesheet_include_uses_comment_form() {
        let found = kinds(
            Syntax::stylesheet(),
            "/*= include reset.css */ [%= include reset.css %]",
        );
        assert_eq!(
            found,
            vec![MacroKind::Include {
                path: "reset.css".into(),
                escaped: false
            }]
        );
    }

    #[test]
    fn stylesheet_image_path_is_quoted() {
        let found = kinds(
            Syntax::stylesheet(),
            r#"url([%= image_path "img/bg.png" %]) url([%= image_path bg.png %])"#,
        );
        assert_eq!(
            found,
            vec![MacroKind::ImagePath {
                path: "img/bg.png".into()
            }]
        );
        assert!(kinds(Syntax::markup(), r#"[%= image_path "bg.png" %]"#).is_empty());
    }

    #[test]
    fn script_include_is_quoted() {
        let found = kinds(Syntax::script(), r#"[%= include "util.js" %]"#);
        assert_eq!(
            found,
            vec![MacroKind::Include {
                path: "util.js".into(),
                escaped: false
            }]
        );
    }

    #[test]
    fn translation_only_in_markup() {
        assert_eq!(
            kinds(Syntax::markup(), "[ welcome message ]"),
            vec![MacroKind::Translate {
                key: "welcome message".into()
            }]
        );
        assert!(kinds(Syntax::script(), "var a = [ welcome ];").is_empty());
    }

    #[test]
    fn url_macros_require_matching_extension() {
        assert!(kinds(Syntax::markup(), "[%= image_url logo.css %]").is_empty());
        assert_eq!(
            kinds(Syntax::markup(), "[%= image_url img/logo.png %]"),
            vec![MacroKind::ImageUrl {
                path: "img/logo.png".into()
            }]
        );
    }
}
