// Copyright 2025 eraflo
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

//! A declaration scanner for GLSL sources.
//!
//! This is not a compiler. It finds the `uniform` / `attribute` declarations
//! a program exposes and performs the few checks a driver would reject
//! outright, which is all the headless device needs to emulate compile, link
//! and program introspection.

use glint_core::renderer::api::gl;
use regex::Regex;
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment pattern"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^\n]*").expect("valid line comment pattern"));
static ERROR_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\s*error\b(.*)$").expect("valid #error pattern"));
static MAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bvoid\s+main\s*\(\s*(void)?\s*\)").expect("valid main pattern"));
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:layout\s*\([^)]*\)\s*)?(uniform|attribute|in)\s+(?:(?:lowp|mediump|highp)\s+)?(\w+)\s+(\w+)\s*(?:\[\s*(\d+)\s*\])?\s*;",
    )
    .expect("valid declaration pattern")
});

/// What a declaration declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclarationKind {
    Uniform,
    Attribute,
}

/// One `uniform` or vertex input declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub ty: u32,
    pub size: i32,
}

/// Maps a GLSL type name to its GL type enumerant.
fn gl_type(name: &str) -> Option<u32> {
    Some(match name {
        "float" => gl::FLOAT,
        "vec2" => gl::FLOAT_VEC2,
        "vec3" => gl::FLOAT_VEC3,
        "vec4" => gl::FLOAT_VEC4,
        "int" => gl::INT,
        "ivec2" => gl::INT_VEC2,
        "ivec3" => gl::INT_VEC3,
        "ivec4" => gl::INT_VEC4,
        "bool" => gl::BOOL,
        "mat2" => gl::FLOAT_MAT2,
        "mat3" => gl::FLOAT_MAT3,
        "mat4" => gl::FLOAT_MAT4,
        "sampler2D" => gl::SAMPLER_2D,
        "samplerCube" => gl::SAMPLER_CUBE,
        _ => return None,
    })
}

fn strip_comments(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(source, " ");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Checks a shader stage and returns its declarations, or an info log.
///
/// `in` declarations count as attributes only in vertex shaders; in fragment
/// shaders they are varyings.
pub(crate) fn compile(stage: u32, source: &str) -> Result<Vec<Declaration>, String> {
    let code = strip_comments(source);

    if let Some(captures) = ERROR_DIRECTIVE.captures(&code) {
        let message = captures.get(1).map_or("", |m| m.as_str()).trim();
        return Err(format!("ERROR: 0:0: '#error' : {message}"));
    }
    if !MAIN.is_match(&code) {
        return Err("ERROR: 0:0: 'main' : function not defined".to_string());
    }
    let opened = code.matches('{').count();
    let closed = code.matches('}').count();
    if opened != closed {
        return Err(format!(
            "ERROR: 0:0: '' : syntax error, unbalanced braces ({opened} opened, {closed} closed)"
        ));
    }

    let mut declarations = Vec::new();
    for captures in DECLARATION.captures_iter(&code) {
        let kind = match &captures[1] {
            "uniform" => DeclarationKind::Uniform,
            "attribute" => DeclarationKind::Attribute,
            _ if stage == gl::VERTEX_SHADER => DeclarationKind::Attribute,
            _ => continue,
        };
        let type_name = &captures[2];
        let Some(ty) = gl_type(type_name) else {
            return Err(format!("ERROR: 0:0: '{type_name}' : unknown type"));
        };
        let size = match captures.get(4) {
            Some(m) => m
                .as_str()
                .parse::<i32>()
                .map_err(|e| format!("ERROR: 0:0: '[' : invalid array size: {e}"))?,
            None => 1,
        };
        declarations.push(Declaration {
            kind,
            name: captures[3].to_string(),
            ty,
            size,
        });
    }
    Ok(declarations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
        attribute vec3 a_position;
        attribute vec2 a_texCoord0;
        uniform mat4 u_projTrans;
        // uniform float u_commented;
        /* uniform float u_block; */
        varying vec2 v_texCoords;
        void main() {
            v_texCoords = a_texCoord0;
            gl_Position = u_projTrans * vec4(a_position, 1.0);
        }
    "#;

    #[test]
    fn test_scans_uniforms_and_attributes() {
        let declarations = compile(gl::VERTEX_SHADER, VERTEX).unwrap();
        let names: Vec<_> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a_position", "a_texCoord0", "u_projTrans"]);
        assert_eq!(declarations[2].ty, gl::FLOAT_MAT4);
        assert_eq!(declarations[0].kind, DeclarationKind::Attribute);
    }

    #[test]
    fn test_array_uniforms_and_precision() {
        let source = "uniform highp vec4 u_lights[8];\nvoid main() {}";
        let declarations = compile(gl::FRAGMENT_SHADER, source).unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].size, 8);
        assert_eq!(declarations[0].ty, gl::FLOAT_VEC4);
    }

    #[test]
    fn test_in_is_an_attribute_only_in_vertex_shaders() {
        let source = "in vec2 v_uv;\nvoid main() {}";
        assert_eq!(compile(gl::VERTEX_SHADER, source).unwrap().len(), 1);
        assert!(compile(gl::FRAGMENT_SHADER, source).unwrap().is_empty());
    }

    #[test]
    fn test_rejections() {
        assert!(compile(gl::VERTEX_SHADER, "uniform float x;").is_err());
        let log = compile(gl::FRAGMENT_SHADER, "#error broken on purpose\nvoid main() {}")
            .unwrap_err();
        assert!(log.contains("broken on purpose"), "got: {log}");
        assert!(compile(gl::FRAGMENT_SHADER, "void main() {").is_err());
        assert!(compile(gl::FRAGMENT_SHADER, "uniform quat q;\nvoid main() {}").is_err());
    }
}
