//! Turns caller-supplied WGSL text into one compilable module.
//!
//! Source text is classified by the first marker it contains, in this order:
//!
//! 1. `fn vertex_main`: a complete program; used verbatim and the vertex
//!    text is dropped.
//! 2. `struct VertexOutput`: fragment code that only lacks a vertex stage;
//!    the vertex text's own `VertexOutput` block is cut out before appending
//!    it, since WGSL rejects a second declaration of the same type.
//! 3. `@fragment`: a native fragment module; appended to the vertex text
//!    as-is without any uniform boilerplate.
//! 4. anything else: a statement snippet, spliced into a generated
//!    `fragment_main` that declares the uniforms, bindings, and coordinates.

use std::fmt;

use serde::Serialize;

use crate::error::UniformError;
use crate::uniforms::{UniformDecl, UniformStore};

pub const VERTEX_ENTRY_POINT: &str = "vertex_main";
pub const FRAGMENT_ENTRY_POINT: &str = "fragment_main";

const VERTEX_ENTRY_MARKER: &str = "fn vertex_main";
const VERTEX_OUTPUT_MARKER: &str = "struct VertexOutput";
const FRAGMENT_ATTRIBUTE_MARKER: &str = "@fragment";

/// Shared vertex-to-fragment interface.
pub const VERTEX_OUTPUT_DECL: &str = r"struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};
";

/// Full-screen quad vertex stage. `uv` runs 0..1 from the top-left corner,
/// matching the pixel coordinates in `@builtin(position)`.
pub const DEFAULT_VERTEX_SOURCE: &str = r"struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vertex_main(@location(0) position: vec2<f32>) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4<f32>(position, 0.0, 1.0);
    output.uv = vec2<f32>(position.x * 0.5 + 0.5, 0.5 - position.y * 0.5);
    return output;
}
";

const BINDINGS: &str = r"@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;
";

const DEFAULT_RETURN: &str = "return vec4<f32>(0.0, 0.0, 0.0, 1.0);";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceShape {
    SelfContained,
    FragmentComplete,
    Native,
    Snippet,
}

impl fmt::Display for SourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceShape::SelfContained => f.write_str("self-contained"),
            SourceShape::FragmentComplete => f.write_str("fragment-complete"),
            SourceShape::Native => f.write_str("native"),
            SourceShape::Snippet => f.write_str("snippet"),
        }
    }
}

/// A merged program ready for the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedProgram {
    source: String,
    shape: SourceShape,
}

impl ComposedProgram {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shape(&self) -> SourceShape {
        self.shape
    }

    pub fn into_source(self) -> String {
        self.source
    }
}

pub fn classify(fragment: &str) -> SourceShape {
    if fragment.contains(VERTEX_ENTRY_MARKER) {
        SourceShape::SelfContained
    } else if fragment.contains(VERTEX_OUTPUT_MARKER) {
        SourceShape::FragmentComplete
    } else if fragment.contains(FRAGMENT_ATTRIBUTE_MARKER) {
        SourceShape::Native
    } else {
        SourceShape::Snippet
    }
}

/// Merges `fragment` with `vertex` (or [`DEFAULT_VERTEX_SOURCE`]).
///
/// `uniforms` only matters for snippets, where it becomes the `Uniforms`
/// struct; an empty slice falls back to the built-in declarations.
pub fn compose_program(
    fragment: &str,
    vertex: Option<&str>,
    uniforms: &[UniformDecl],
) -> ComposedProgram {
    let vertex = vertex.unwrap_or(DEFAULT_VERTEX_SOURCE);
    let shape = classify(fragment);
    let source = match shape {
        SourceShape::SelfContained => fragment.to_string(),
        SourceShape::FragmentComplete => {
            let stripped = strip_vertex_output(vertex);
            format!("{fragment}\n{stripped}")
        }
        SourceShape::Native => format!("{vertex}\n{fragment}"),
        SourceShape::Snippet => {
            let stripped = strip_vertex_output(vertex);
            let wrapped = if uniforms.is_empty() {
                wrap_snippet(fragment, &UniformStore::with_builtins().declarations())
            } else {
                wrap_snippet(fragment, uniforms)
            };
            format!("{stripped}\n{wrapped}")
        }
    };
    ComposedProgram { source, shape }
}

/// Emits the `Uniforms` struct matching the store's packed layout.
pub fn uniform_struct(uniforms: &[UniformDecl]) -> String {
    let mut out = String::from("struct Uniforms {\n");
    for decl in uniforms {
        out.push_str(&format!("    @align(16) {}: {},\n", decl.name, decl.ty.wgsl()));
    }
    out.push_str("};\n");
    out
}

/// Names the snippet wrapper declares in the same scope as the uniform
/// locals.
const WRAPPER_NAMES: &[&str] = &[
    "uv",
    "frag_coord",
    "frag_in",
    "uniforms",
    "u_texture",
    "u_sampler",
    "Uniforms",
    "VertexOutput",
    VERTEX_ENTRY_POINT,
    FRAGMENT_ENTRY_POINT,
];

const WGSL_KEYWORDS: &[&str] = &[
    "alias", "break", "case", "const", "const_assert", "continue", "continuing", "default",
    "diagnostic", "discard", "else", "enable", "false", "fn", "for", "if", "let", "loop",
    "override", "requires", "return", "struct", "switch", "true", "var", "while",
];

// A subset of WGSL's reserved words; naga rejects these as identifiers.
const WGSL_RESERVED: &[&str] = &[
    "as", "async", "await", "become", "cast", "catch", "class", "do", "enum", "export", "extern",
    "final", "impl", "macro", "match", "mod", "move", "mut", "new", "null", "of", "priv", "pub",
    "ref", "self", "static", "super", "this", "throw", "try", "type", "typedef", "typeof",
    "unsafe", "use", "virtual", "where", "with", "yield",
];

/// Checks that `name` can become both a `Uniforms` member and a snippet
/// local without clashing with the wrapper.
pub fn check_uniform_name(name: &str) -> Result<(), UniformError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
                && name != "_"
                && !name.starts_with("__")
        }
        _ => false,
    };
    if !valid || WGSL_KEYWORDS.contains(&name) || WGSL_RESERVED.contains(&name) {
        return Err(UniformError::InvalidName(name.to_string()));
    }
    if WRAPPER_NAMES.contains(&name) {
        return Err(UniformError::Reserved(name.to_string()));
    }
    Ok(())
}

fn wrap_snippet(snippet: &str, uniforms: &[UniformDecl]) -> String {
    let mut locals = String::new();
    for decl in uniforms {
        locals.push_str(&format!("    let {name} = uniforms.{name};\n", name = decl.name));
    }

    let mut body = String::new();
    for line in snippet.lines() {
        body.push_str("        ");
        body.push_str(line);
        body.push('\n');
    }

    // naga rejects statements after a `return` in the same block, so the
    // snippet gets its own `if` scope and the fallback sits outside it.
    format!(
        "{structure}\n{BINDINGS}\n{VERTEX_OUTPUT_DECL}\n@fragment\nfn {FRAGMENT_ENTRY_POINT}(frag_in: VertexOutput) -> @location(0) vec4<f32> {{\n{locals}    let uv = frag_in.uv;\n    let frag_coord = frag_in.position.xy;\n    if true {{\n{body}    }}\n    {DEFAULT_RETURN}\n}}\n",
        structure = uniform_struct(uniforms),
    )
}

/// Removes the first `struct VertexOutput { ... }` block, including a
/// trailing `;`, from `vertex`. Text without the block is returned unchanged.
pub fn strip_vertex_output(vertex: &str) -> String {
    let Some(start) = vertex.find(VERTEX_OUTPUT_MARKER) else {
        return vertex.to_string();
    };
    let Some(open) = vertex[start..].find('{').map(|offset| start + offset) else {
        return vertex.to_string();
    };

    let mut depth = 0usize;
    let mut close = None;
    for (offset, ch) in vertex[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + offset);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return vertex.to_string();
    };

    let mut end = close + 1;
    let rest = &vertex[end..];
    let trimmed = rest.trim_start_matches(|ch: char| ch == ' ' || ch == '\t');
    if trimmed.starts_with(';') {
        end += rest.len() - trimmed.len() + 1;
    }
    if vertex[end..].starts_with('\n') {
        end += 1;
    }

    let mut out = String::with_capacity(vertex.len());
    out.push_str(&vertex[..start]);
    out.push_str(&vertex[end..]);
    out
}
