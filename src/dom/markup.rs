// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Markup parsing for the reference document
//!
//! Accepts the HTML subset templates are written in: elements with quoted,
//! unquoted or bare attributes, void elements, self-closing tags, text and
//! comments. Entities `&amp; &lt; &gt; &quot; &#39;` and numeric references
//! are decoded.

use crate::error::{TemplateError, TemplateResult};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, opt},
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, preceded},
};

/// Elements that never have children or a closing tag
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Deepest element nesting accepted in a fragment
pub const MAX_MARKUP_DEPTH: usize = 256;

/// Parsed node before insertion into a document
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    /// Element with attributes in source order
    Element {
        /// Tag name
        tag: String,
        /// Attributes
        attributes: Vec<(String, String)>,
        /// Child nodes
        children: Vec<MarkupNode>,
    },
    /// Decoded text
    Text(String),
    /// Comment body
    Comment(String),
}

/// Whether `tag` is a void element
pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Parse a markup fragment into top-level nodes
pub fn parse_fragment(input: &str) -> TemplateResult<Vec<MarkupNode>> {
    match nodes(input, 0) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(markup_error(input, rest, "unexpected markup")),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(markup_error(
            input,
            e.input,
            &format!("elements nested deeper than {MAX_MARKUP_DEPTH} levels"),
        )),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            Err(markup_error(input, e.input, "malformed markup"))
        }
        Err(nom::Err::Incomplete(_)) => Err(TemplateError::Markup {
            offset: input.len(),
            message: "unexpected end of markup".to_string(),
        }),
    }
}

fn markup_error(input: &str, rest: &str, message: &str) -> TemplateError {
    let offset = input.len() - rest.len();
    let excerpt: String = rest.chars().take(20).collect();
    TemplateError::Markup {
        offset,
        message: format!("{message} near '{excerpt}'"),
    }
}

fn nodes<'a>(input: &'a str, depth: usize) -> IResult<&'a str, Vec<MarkupNode>> {
    many0(|i: &'a str| node(i, depth)).parse(input)
}

fn node<'a>(input: &'a str, depth: usize) -> IResult<&'a str, MarkupNode> {
    alt((comment, |i: &'a str| element(i, depth), text)).parse(input)
}

fn comment(input: &str) -> IResult<&str, MarkupNode> {
    map(
        delimited(tag("<!--"), take_until("-->"), tag("-->")),
        |body: &str| MarkupNode::Comment(body.to_string()),
    )
    .parse(input)
}

fn text(input: &str) -> IResult<&str, MarkupNode> {
    map(take_while1(|c: char| c != '<'), |raw: &str| {
        MarkupNode::Text(decode_entities(raw))
    })
    .parse(input)
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')).parse(input)
}

fn attribute_value(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('"'), take_until("\""), char('"')), decode_entities),
        map(delimited(char('\''), take_until("'"), char('\'')), decode_entities),
        map(
            take_while1(|c: char| !c.is_whitespace() && !matches!(c, '>' | '"' | '\'' | '=' | '<' | '`')),
            decode_entities,
        ),
    ))
    .parse(input)
}

fn attribute(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = multispace1.parse(input)?;
    let (input, key) = name.parse(input)?;
    let (input, value) = opt(preceded(
        (multispace0, char('='), multispace0),
        attribute_value,
    ))
    .parse(input)?;
    Ok((input, (key.to_string(), value.unwrap_or_default())))
}

fn element<'a>(input: &'a str, depth: usize) -> IResult<&'a str, MarkupNode> {
    let (input, _) = char('<').parse(input)?;
    let (input, tag_name) = name.parse(input)?;
    if depth >= MAX_MARKUP_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)));
    }
    let (input, attributes) = many0(attribute).parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, self_closing) = alt((map(tag("/>"), |_| true), map(tag(">"), |_| false))).parse(input)?;

    if self_closing || is_void(tag_name) {
        return Ok((
            input,
            MarkupNode::Element {
                tag: tag_name.to_string(),
                attributes,
                children: Vec::new(),
            },
        ));
    }

    let (input, children) = nodes(input, depth + 1)?;
    let (input, _) = tag("</").parse(input)?;
    let (rest, closing) = name.parse(input)?;
    if !closing.eq_ignore_ascii_case(tag_name) {
        return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Tag)));
    }
    let (rest, _) = (take_while(char::is_whitespace), char('>')).parse(rest)?;
    Ok((
        rest,
        MarkupNode::Element {
            tag: tag_name.to_string(),
            attributes,
            children,
        },
    ))
}

/// Decode the supported character references
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
