use std::fs;
use std::path::{Path, PathBuf};

use super::ShaderError;

/// Reads a shader source file, expanding `#include "file"` lines relative to
/// the including file, and inserts one `#define` per entry of `defines`
/// right after a leading `#version` line.
pub fn load_file_with_directives(path: &Path, defines: &[String]) -> Result<String, ShaderError> {
    if let Some(bad) = defines
        .iter()
        .find(|define| define.trim().is_empty() || define.contains(['\n', '\r']))
    {
        return Err(ShaderError::InvalidDefine(bad.clone()));
    }

    let mut stack = Vec::new();
    let mut body = String::new();
    expand(path, &mut stack, &mut body)?;
    Ok(insert_defines(&body, defines))
}

fn expand(path: &Path, stack: &mut Vec<PathBuf>, out: &mut String) -> Result<(), ShaderError> {
    let text = fs::read_to_string(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if stack.contains(&canonical) {
        return Err(ShaderError::IncludeCycle(path.to_path_buf()));
    }
    stack.push(canonical);

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    for (number, line) in text.lines().enumerate() {
        let Some(rest) = line.trim_start().strip_prefix("#include") else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let name = rest
            .trim()
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ShaderError::MalformedInclude {
                path: path.to_path_buf(),
                line: number + 1,
            })?;
        expand(&dir.join(name), stack, out)?;
    }

    stack.pop();
    Ok(())
}

fn insert_defines(body: &str, defines: &[String]) -> String {
    if defines.is_empty() {
        return body.to_string();
    }
    let directives: String = defines
        .iter()
        .map(|define| format!("#define {}\n", define.trim()))
        .collect();

    let first = body.lines().next().unwrap_or_default();
    if first.trim_start().starts_with("#version") {
        let rest = &body[first.len()..];
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        format!("{}\n{}{}", first, directives, rest)
    } else {
        format!("{}{}", directives, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use std::io::Write;

    #[test]
    fn test_defines_follow_version() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.glslv");
        file.write_str("#version 300 es\nvoid main() {}\n").unwrap();

        let text = load_file_with_directives(
            file.path(),
            &["SKINNED".to_string(), "MAX_LIGHTS 4".to_string()],
        )
        .unwrap();
        assert_eq!(
            text,
            "#version 300 es\n#define SKINNED\n#define MAX_LIGHTS 4\nvoid main() {}\n"
        );
    }

    #[test]
    fn test_defines_without_version_go_first() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.glslf");
        file.write_str("void main() {}\n").unwrap();

        let text = load_file_with_directives(file.path(), &["FOG".to_string()]).unwrap();
        assert_eq!(text, "#define FOG\nvoid main() {}\n");
    }

    #[test]
    fn test_include_is_expanded_relative() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("lib/common.glsl")
            .write_str("uniform float time;\n")
            .unwrap();
        let file = temp.child("a.glslv");
        file.write_str("#include \"lib/common.glsl\"\nvoid main() {}\n")
            .unwrap();

        let text = load_file_with_directives(file.path(), &[]).unwrap();
        assert_eq!(text, "uniform float time;\nvoid main() {}\n");
    }

    #[test]
    fn test_include_cycle_detected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.glsl").write_str("#include \"b.glsl\"\n").unwrap();
        temp.child("b.glsl").write_str("#include \"a.glsl\"\n").unwrap();

        let result = load_file_with_directives(&temp.path().join("a.glsl"), &[]);
        assert!(matches!(result, Err(ShaderError::IncludeCycle(_))));
    }

    #[test]
    fn test_malformed_include() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.glsl");
        file.write_str("void f();\n#include common.glsl\n").unwrap();

        let result = load_file_with_directives(file.path(), &[]);
        assert!(matches!(
            result,
            Err(ShaderError::MalformedInclude { line: 2, .. })
        ));
    }

    #[test]
    fn test_no_defines_leaves_source_untouched() {
        let mut file = tempfile::Builder::new().suffix(".glslv").tempfile().unwrap();
        write!(file, "#version 100\nvoid main() {{}}\n").unwrap();

        let text = load_file_with_directives(file.path(), &[]).unwrap();
        assert_eq!(text, "#version 100\nvoid main() {}\n");
    }

    #[test]
    fn test_missing_file_and_bad_define() {
        let temp = assert_fs::TempDir::new().unwrap();
        let missing = temp.path().join("missing.glslv");
        assert!(matches!(
            load_file_with_directives(&missing, &[]),
            Err(ShaderError::Io { .. })
        ));

        let file = temp.child("a.glsl");
        file.write_str("void main() {}\n").unwrap();
        assert!(matches!(
            load_file_with_directives(file.path(), &["A\nB".to_string()]),
            Err(ShaderError::InvalidDefine(_))
        ));
    }
}
