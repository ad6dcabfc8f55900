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

//! Splitting of list and sequence attribute values

/// Split a `label=expr | label=expr` list into trimmed tokens
///
/// Splitting on `|` also splits a logical `||`; the empty segment this leaves
/// behind marks the false split, and its neighbours are rejoined with ` || `.
pub fn split_list(source: &str) -> Vec<String> {
    let segments: Vec<&str> = source.split('|').map(str::trim).collect();
    let mut tokens: Vec<String> = Vec::with_capacity(segments.len());
    let mut i = 0;
    while i < segments.len() {
        if segments[i].is_empty() {
            i += 1;
            let next = segments.get(i).copied();
            match (tokens.pop(), next) {
                (Some(previous), Some(next)) => tokens.push(format!("{previous} || {next}")),
                (Some(previous), None) => tokens.push(previous),
                (None, Some(next)) => tokens.push(next.to_string()),
                (None, None) => {}
            }
        } else {
            tokens.push(segments[i].to_string());
        }
        i += 1;
    }
    tokens
}

/// Split an `expr; expr` sequence, dropping empty statements
pub fn split_sequence(source: &str) -> Vec<&str> {
    source
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}
