// Tokenizer and strict token decoding.
//
// Grammar (informal):
//
//   stream      := item (';' item)*
//   item        := (text? placeholder)* text?
//   placeholder := '<extra_id_' digits '>'
//   text        := 'N:' u7 | 'd:' u32 | 'w:' u32 | 'M:' u32 | 'I:' u32
//
// Placeholders are frequently glued to a neighbouring token without a
// separator (`<extra_id_5>N:60`, `w:480<extra_id_1>`), so `Tokens` splits
// each `;`-separated item around placeholder markers. Whitespace around
// tokens is ignored and empty items produce nothing.

use std::str::FromStr;

use crate::error::CodecError;
use crate::types::{Instruction, MAX_PITCH, PlaceholderId};

pub const PLACEHOLDER_PREFIX: &str = "<extra_id_";
pub const PLACEHOLDER_SUFFIX: char = '>';
pub const SEPARATOR: char = ';';

/// Iterator over the raw token slices of a notation stream.
pub struct Tokens<'a> {
    items: std::str::Split<'a, char>,
    rest: &'a str,
}

/// Split a notation stream into raw token slices.
pub fn tokenize(stream: &str) -> Tokens<'_> {
    Tokens {
        items: stream.split(SEPARATOR),
        rest: "",
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.rest.is_empty() {
                self.rest = self.items.next()?.trim();
                continue;
            }

            let (token, rest) = match self.rest.find(PLACEHOLDER_PREFIX) {
                Some(0) => match self.rest.find(PLACEHOLDER_SUFFIX) {
                    Some(end) => self.rest.split_at(end + 1),
                    // Unterminated marker: the rest of the item is one bad token.
                    None => (self.rest, ""),
                },
                Some(pos) => self.rest.split_at(pos),
                None => (self.rest, ""),
            };
            self.rest = rest.trim_start();

            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
}

impl FromStr for Instruction {
    type Err = CodecError;

    fn from_str(token: &str) -> Result<Self, CodecError> {
        if let Some(body) = token.strip_prefix(PLACEHOLDER_PREFIX) {
            let digits = body
                .strip_suffix(PLACEHOLDER_SUFFIX)
                .ok_or_else(|| invalid(token))?;
            return Ok(Instruction::Placeholder(PlaceholderId(int_payload(
                token, digits,
            )?)));
        }

        let (tag, payload) = token
            .split_once(':')
            .ok_or_else(|| CodecError::UnknownToken(token.to_string()))?;
        match tag {
            "N" => {
                let pitch = int_payload(token, payload)?;
                match u8::try_from(pitch) {
                    Ok(p) if p <= MAX_PITCH => Ok(Instruction::Note(p)),
                    _ => Err(CodecError::PitchOutOfRange(pitch)),
                }
            }
            "d" => Ok(Instruction::Duration(int_payload(token, payload)?)),
            "w" => Ok(Instruction::Wait(int_payload(token, payload)?)),
            "M" => Ok(Instruction::Measure(int_payload(token, payload)?)),
            "I" => Ok(Instruction::Track(int_payload(token, payload)?)),
            _ => Err(CodecError::UnknownToken(token.to_string())),
        }
    }
}

fn int_payload(token: &str, payload: &str) -> Result<u32, CodecError> {
    payload.trim().parse().map_err(|_| invalid(token))
}

fn invalid(token: &str) -> CodecError {
    CodecError::InvalidPayload {
        token: token.to_string(),
    }
}

/// Decode every token of a stream, logging and skipping the ones that do not
/// decode.
pub fn decode_lenient(stream: &str) -> impl Iterator<Item = Instruction> + '_ {
    tokenize(stream).filter_map(|token| match token.parse::<Instruction>() {
        Ok(instruction) => Some(instruction),
        Err(e) => {
            log::debug!("dropping token: {e}");
            None
        }
    })
}
