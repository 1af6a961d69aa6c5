//! Rich text documents and token substitution over them.
//!
//! A rich text block holds block-level elements (sections, lists, quotes,
//! preformatted runs); those hold inline leaves (text, links, mentions).
//! Element kinds this module does not know are carried through verbatim,
//! as are unknown fields on known kinds.

use crate::token::{Mention, Replacements, substitute_text};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A rich text document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextBlock {
    /// Block type tag; `rich_text` for documents produced by the editor.
    #[serde(rename = "type")]
    pub kind: String,
    /// Block-level children.
    #[serde(default)]
    pub elements: Vec<BlockElement>,
    /// Fields this model does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RichTextBlock {
    /// Creates a document from block elements.
    #[must_use]
    pub fn new(elements: Vec<BlockElement>) -> Self {
        Self {
            kind: "rich_text".to_string(),
            elements,
            extra: Map::new(),
        }
    }
}

/// A block-level element, or an element kind this model does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockElement {
    /// A recognized block element.
    Known(KnownBlockElement),
    /// Passed through untouched.
    Other(JsonValue),
}

/// Recognized block-level elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownBlockElement {
    /// A paragraph of inline elements.
    RichTextSection {
        elements: Vec<InlineElement>,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A list whose items are themselves block elements.
    RichTextList {
        elements: Vec<BlockElement>,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A quoted run of inline elements.
    RichTextQuote {
        elements: Vec<InlineElement>,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A preformatted run of inline elements.
    RichTextPreformatted {
        elements: Vec<InlineElement>,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
}

/// An inline leaf, or a leaf kind this model does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InlineElement {
    /// A recognized inline element.
    Known(KnownInlineElement),
    /// Passed through untouched.
    Other(JsonValue),
}

/// Recognized inline elements.
///
/// Styling and any other attributes stay in `extra` as raw JSON, so an
/// explicit `null` survives a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownInlineElement {
    /// A styled text run.
    Text {
        text: String,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A hyperlink with optional display text.
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A native user mention.
    User {
        user_id: String,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
    /// A native channel mention.
    Channel {
        channel_id: String,
        #[serde(flatten)]
        extra: Map<String, JsonValue>,
    },
}

impl InlineElement {
    /// Creates an unstyled text run.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Known(KnownInlineElement::Text {
            text: text.into(),
            extra: Map::new(),
        })
    }
}

impl BlockElement {
    /// Creates a section of inline elements.
    #[must_use]
    pub fn section(elements: Vec<InlineElement>) -> Self {
        Self::Known(KnownBlockElement::RichTextSection {
            elements,
            extra: Map::new(),
        })
    }
}

/// Substitutes tokens throughout a rich text document.
///
/// A text leaf whose entire text is a token whose value is a mention is
/// replaced by a native mention node; every other text or link leaf gets
/// plain substring substitution.
#[must_use]
pub fn substitute_rich_text(mut block: RichTextBlock, replacements: &Replacements) -> RichTextBlock {
    block.elements = block
        .elements
        .into_iter()
        .map(|element| substitute_block_element(element, replacements))
        .collect();
    block
}

/// Parses a serialized document, substitutes tokens and re-serializes it.
///
/// An empty input is returned unchanged.
///
/// # Errors
///
/// Returns an error if the input is not a rich text document.
pub fn substitute_rich_text_json(
    raw: &str,
    replacements: &Replacements,
) -> Result<String, serde_json::Error> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let block: RichTextBlock = serde_json::from_str(raw)?;
    serde_json::to_string(&substitute_rich_text(block, replacements))
}

fn substitute_block_element(element: BlockElement, replacements: &Replacements) -> BlockElement {
    let BlockElement::Known(known) = element else {
        return element;
    };
    let inline = |elements: Vec<InlineElement>| -> Vec<InlineElement> {
        elements
            .into_iter()
            .map(|e| substitute_inline_element(e, replacements))
            .collect()
    };
    BlockElement::Known(match known {
        KnownBlockElement::RichTextList { elements, extra } => KnownBlockElement::RichTextList {
            elements: elements
                .into_iter()
                .map(|e| substitute_block_element(e, replacements))
                .collect(),
            extra,
        },
        KnownBlockElement::RichTextSection { elements, extra } => {
            KnownBlockElement::RichTextSection {
                elements: inline(elements),
                extra,
            }
        }
        KnownBlockElement::RichTextQuote { elements, extra } => KnownBlockElement::RichTextQuote {
            elements: inline(elements),
            extra,
        },
        KnownBlockElement::RichTextPreformatted { elements, extra } => {
            KnownBlockElement::RichTextPreformatted {
                elements: inline(elements),
                extra,
            }
        }
    })
}

fn substitute_inline_element(element: InlineElement, replacements: &Replacements) -> InlineElement {
    let InlineElement::Known(known) = element else {
        return element;
    };
    InlineElement::Known(match known {
        KnownInlineElement::Text { text, extra } => {
            // Exact-token leaves holding a mention become native mention nodes.
            let mention = replacements
                .iter()
                .filter(|(token, _)| *token == text)
                .find_map(|(_, value)| Mention::parse(value));
            match mention {
                Some(Mention::User(user_id)) => KnownInlineElement::User {
                    user_id,
                    extra: mention_attributes(extra),
                },
                Some(Mention::Channel(channel_id)) => KnownInlineElement::Channel {
                    channel_id,
                    extra: mention_attributes(extra),
                },
                None => KnownInlineElement::Text {
                    text: substitute_text(&text, replacements),
                    extra,
                },
            }
        }
        KnownInlineElement::Link { url, text, extra } => KnownInlineElement::Link {
            url,
            text: text.map(|t| substitute_text(&t, replacements)),
            extra,
        },
        other => other,
    })
}

/// A mention keeps the replaced leaf's styling and nothing else.
fn mention_attributes(mut leaf: Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut attributes = Map::new();
    if let Some(style) = leaf.remove("style") {
        attributes.insert("style".to_string(), style);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TRIGGER_USER_ID, TRIGGER_USER_PING};
    use serde_json::json;

    fn document() -> JsonValue {
        json!({
            "type": "rich_text",
            "block_id": "b1",
            "elements": [
                {
                    "type": "rich_text_section",
                    "elements": [
                        {"type": "text", "text": "Hello "},
                        {"type": "text", "text": "$!{ctx.trigger_user_ping}", "style": {"bold": true}},
                        {"type": "emoji", "name": "wave"},
                        {"type": "user", "user_id": "U9", "unknown": "x"},
                        {"type": "channel", "channel_id": "C9", "style": null},
                        {"type": "text", "text": "hi", "style": null}
                    ]
                },
                {
                    "type": "rich_text_list",
                    "style": "bullet",
                    "elements": [
                        {
                            "type": "rich_text_section",
                            "elements": [
                                {"type": "link", "url": "https://example.com", "text": "id $!{ctx.trigger_user_id}"}
                            ]
                        }
                    ]
                },
                {"type": "rich_text_unknown", "payload": 1}
            ]
        })
    }

    fn replacements() -> Replacements {
        let mut r = Replacements::new();
        r.insert(TRIGGER_USER_ID, "U123");
        r.insert(TRIGGER_USER_PING, "<@U123>");
        r
    }

    #[test]
    fn empty_replacements_leave_tree_identical() {
        let block: RichTextBlock = serde_json::from_value(document()).expect("parse");
        let out = substitute_rich_text(block, &Replacements::new());
        assert_eq!(serde_json::to_value(out).expect("serialize"), document());
    }

    #[test]
    fn exact_mention_token_becomes_mention_node() {
        let block: RichTextBlock = serde_json::from_value(document()).expect("parse");
        let out = serde_json::to_value(substitute_rich_text(block, &replacements())).expect("serialize");
        assert_eq!(
            out["elements"][0]["elements"][1],
            json!({"type": "user", "user_id": "U123", "style": {"bold": true}})
        );
        assert_eq!(out["elements"][0]["elements"][0]["text"], "Hello ");
        assert_eq!(out["elements"][0]["elements"][2], json!({"type": "emoji", "name": "wave"}));
        assert_eq!(
            out["elements"][0]["elements"][3],
            json!({"type": "user", "user_id": "U9", "unknown": "x"})
        );
        assert_eq!(
            out["elements"][0]["elements"][5],
            json!({"type": "text", "text": "hi", "style": null})
        );
    }

    #[test]
    fn nested_list_leaves_are_substituted() {
        let block: RichTextBlock = serde_json::from_value(document()).expect("parse");
        let out = serde_json::to_value(substitute_rich_text(block, &replacements())).expect("serialize");
        let link = &out["elements"][1]["elements"][0]["elements"][0];
        assert_eq!(link["text"], "id U123");
        assert_eq!(link["url"], "https://example.com");
        assert_eq!(out["elements"][1]["style"], "bullet");
        assert_eq!(out["elements"][2], json!({"type": "rich_text_unknown", "payload": 1}));
    }

    #[test]
    fn token_inside_longer_text_stays_textual() {
        let block = RichTextBlock::new(vec![BlockElement::section(vec![InlineElement::text(
            "hey $!{ctx.trigger_user_ping}!",
        )])]);
        let out = serde_json::to_value(substitute_rich_text(block, &replacements())).expect("serialize");
        assert_eq!(
            out["elements"][0]["elements"][0],
            json!({"type": "text", "text": "hey <@U123>!"})
        );
    }

    #[test]
    fn channel_mention_value_becomes_channel_node() {
        let mut r = Replacements::new();
        r.insert("$!{outputs.s1.id}", "<#C0FFEE>");
        let block = RichTextBlock::new(vec![BlockElement::section(vec![InlineElement::text(
            "$!{outputs.s1.id}",
        )])]);
        let out = serde_json::to_value(substitute_rich_text(block, &r)).expect("serialize");
        assert_eq!(
            out["elements"][0]["elements"][0],
            json!({"type": "channel", "channel_id": "C0FFEE"})
        );
    }

    #[test]
    fn json_helper_passes_empty_through_and_rejects_garbage() {
        assert_eq!(substitute_rich_text_json("", &replacements()).expect("empty"), "");
        assert!(substitute_rich_text_json("{not json", &replacements()).is_err());
    }
}
