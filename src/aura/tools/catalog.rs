//! The concrete tool catalog: filesystem primitives, dependency
//! management, lightweight symbol-level text edits, and meta tools.
//! Filesystem and dependency actions are grounded directly in
//! `src/foundry/actions/file_system_actions.py` and
//! `dependency_management_actions.py`. The symbol-level tools
//! (`add_function_to_file` and friends) are a deliberate simplification
//! of the original's `ast`-module rewriting: the core is language
//! agnostic, so they operate on source text via anchored insertion
//! rather than a full language-aware AST (see DESIGN.md).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{RequiredService, ServiceBundle, ToolAction, ToolCatalog, ToolDescriptor};
use crate::aura::error::AuraError;

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn path_set(keys: &[&'static str]) -> HashSet<&'static str> {
    keys.iter().copied().collect()
}

fn services(keys: &[RequiredService]) -> HashSet<RequiredService> {
    keys.iter().copied().collect()
}

macro_rules! sync_action {
    ($name:ident, $body:expr) => {
        struct $name;
        #[async_trait]
        impl ToolAction for $name {
            async fn execute(
                &self,
                args: &Map<String, Value>,
                project_root: &Path,
                _user_id: &str,
                services: &ServiceBundle,
            ) -> Result<Value, AuraError> {
                let f: fn(&Map<String, Value>, &Path, &ServiceBundle) -> Result<Value, AuraError> = $body;
                f(args, project_root, services)
            }
        }
    };
}

// -- filesystem primitives, grounded in file_system_actions.py --

sync_action!(WriteFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let content = str_arg(args, "content").unwrap_or_default();
    if content.trim().is_empty() {
        return Ok(json!(format!(
            "Error: Attempted to write an empty or whitespace-only file to '{}'. Operation aborted.",
            path
        )));
    }
    let path_obj = PathBuf::from(path);
    if let Some(parent) = path_obj.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
        }
    }
    fs::write(&path_obj, content).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!(
        "Successfully wrote {} bytes to {}",
        content.len(),
        path
    )))
});

sync_action!(AppendToFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let content = str_arg(args, "content").unwrap_or_default();
    let path_obj = PathBuf::from(path);
    if !path_obj.is_file() {
        return Ok(json!(format!("Error: File not found at path '{}'. Cannot append.", path)));
    }
    let existing = fs::read_to_string(&path_obj).unwrap_or_default();
    let mut new_content = existing;
    if !new_content.is_empty() && !new_content.ends_with('\n') {
        new_content.push('\n');
    }
    new_content.push_str(content);
    fs::write(&path_obj, &new_content).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully appended {} bytes to {}", content.len(), path)))
});

sync_action!(ReadFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let path_obj = PathBuf::from(path);
    if !path_obj.exists() {
        return Ok(json!(format!("Error: File not found at path '{}'", path)));
    }
    if !path_obj.is_file() {
        return Ok(json!(format!("Error: Path '{}' is a directory, not a file.", path)));
    }
    let content = fs::read_to_string(&path_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(content))
});

sync_action!(ListFilesAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or(".");
    let path_obj = PathBuf::from(path);
    if !path_obj.exists() {
        return Ok(json!(format!("Error: Directory not found at path '{}'", path)));
    }
    if !path_obj.is_dir() {
        return Ok(json!(format!("Error: Path '{}' is a file, not a directory.", path)));
    }
    let mut entries: Vec<String> = fs::read_dir(&path_obj)
        .map_err(|e| AuraError::ToolFailure(e.to_string()))?
        .filter_map(|e| e.ok())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            if e.path().is_dir() {
                format!("{}/", name)
            } else {
                name
            }
        })
        .collect();
    entries.sort();
    if entries.is_empty() {
        return Ok(json!(format!("Directory '{}' is empty.", path)));
    }
    Ok(json!(format!("Contents of '{}':\n{}", path, entries.join("\n"))))
});

sync_action!(CreateDirectoryAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let path_obj = PathBuf::from(path);
    if path_obj.exists() {
        return Ok(json!(format!("Error: Directory already exists at {}", path)));
    }
    fs::create_dir_all(&path_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully created directory at {}", path)))
});

sync_action!(CreatePackageInitAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let dir_path = PathBuf::from(path);
    fs::create_dir_all(&dir_path).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    let init_path = dir_path.join("mod.rs");
    if init_path.exists() {
        return Ok(json!(format!("Package already initialized at '{}'.", path)));
    }
    let package_name = dir_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    fs::write(&init_path, format!("//! Initializes the '{}' module.\n", package_name))
        .map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully initialized package '{}' at '{}'.", package_name, path)))
});

sync_action!(DeleteDirectoryAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let path_obj = PathBuf::from(path);
    if !path_obj.exists() {
        return Ok(json!(format!("Error: Cannot delete. Directory not found at '{}'.", path)));
    }
    if !path_obj.is_dir() {
        return Ok(json!(format!(
            "Error: Path '{}' is a file, not a directory. Use 'delete_file' instead.",
            path
        )));
    }
    fs::remove_dir_all(&path_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully deleted directory: {}", path)))
});

sync_action!(DeleteFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let path_obj = PathBuf::from(path);
    if !path_obj.exists() {
        return Ok(json!(format!("Error: Cannot delete. File not found at '{}'.", path)));
    }
    if !path_obj.is_file() {
        return Ok(json!(format!(
            "Error: Path '{}' is a directory, not a file. This tool only deletes files.",
            path
        )));
    }
    fs::remove_file(&path_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully deleted file: {}", path)))
});

sync_action!(CopyFileAction, |args, _root, _services| {
    let source = str_arg(args, "source_path").unwrap_or_default();
    let destination = str_arg(args, "destination_path").unwrap_or_default();
    let source_obj = PathBuf::from(source);
    let destination_obj = PathBuf::from(destination);
    if !source_obj.exists() {
        return Ok(json!(format!("Error: Source file not found at '{}'.", source)));
    }
    if !source_obj.is_file() {
        return Ok(json!(format!(
            "Error: Source path '{}' is a directory, not a file. This tool only copies files.",
            source
        )));
    }
    if let Some(parent) = destination_obj.parent() {
        fs::create_dir_all(parent).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    }
    fs::copy(&source_obj, &destination_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully copied file from '{}' to '{}'.", source, destination)))
});

sync_action!(MoveFileAction, |args, _root, _services| {
    let source = str_arg(args, "source_path").unwrap_or_default();
    let destination = str_arg(args, "destination_path").unwrap_or_default();
    let source_obj = PathBuf::from(source);
    let destination_obj = PathBuf::from(destination);
    if !source_obj.exists() {
        return Ok(json!(format!("Error: Source file not found at '{}'.", source)));
    }
    if !source_obj.is_file() {
        return Ok(json!(format!(
            "Error: Source path '{}' is a directory, not a file. This tool only moves files.",
            source
        )));
    }
    if let Some(parent) = destination_obj.parent() {
        fs::create_dir_all(parent).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    }
    fs::rename(&source_obj, &destination_obj).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully moved file from '{}' to '{}'.", source, destination)))
});

// -- dependency management, grounded in dependency_management_actions.py --

fn package_name(dependency: &str) -> String {
    dependency
        .split("==")
        .next()
        .unwrap_or(dependency)
        .split('>')
        .next()
        .unwrap_or(dependency)
        .split('<')
        .next()
        .unwrap_or(dependency)
        .trim()
        .to_string()
}

sync_action!(AddDependencyToRequirementsAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or("requirements.txt");
    let dependency = str_arg(args, "dependency").unwrap_or_default();
    if dependency.is_empty() {
        return Ok(json!("Error: No dependency provided."));
    }
    let req_file = PathBuf::from(path);
    if let Some(parent) = req_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
        }
    }
    let existing = fs::read_to_string(&req_file).unwrap_or_default();
    let wanted = package_name(dependency);
    let already_present = existing.lines().any(|line| package_name(line) == wanted);
    if already_present {
        return Ok(json!(format!(
            "Dependency '{}' already exists in '{}'. No changes made.",
            wanted, path
        )));
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(dependency);
    updated.push('\n');
    fs::write(&req_file, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully added '{}' to '{}'.", dependency, path)))
});

// -- symbol-level text edits: anchored insertion, not a full AST engine --

fn insert_after_anchor(source: &str, anchor: &str, insertion: &str) -> Option<String> {
    let idx = source.find(anchor)?;
    let line_end = source[idx..].find('\n').map(|o| idx + o + 1).unwrap_or(source.len());
    let mut out = String::with_capacity(source.len() + insertion.len());
    out.push_str(&source[..line_end]);
    out.push_str(insertion);
    if !insertion.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&source[line_end..]);
    Some(out)
}

/// Candidate anchors for a class/type definition, tried in order, since
/// the edited file's language isn't known up front (it's the target
/// project's source, not ours -- see `write_file(path="src/main.py", ...)`
/// in the agent's own examples).
fn class_anchor_candidates(class_name: &str) -> Vec<String> {
    vec![
        format!("impl {}", class_name),
        format!("class {}:", class_name),
        format!("class {}(", class_name),
        format!("class {} {{", class_name),
        format!("struct {}", class_name),
    ]
}

/// Candidate anchors for a function/method signature across the
/// languages an edited project might be written in.
fn function_anchor_candidates(function_name: &str) -> Vec<String> {
    vec![
        format!("fn {}(", function_name),
        format!("def {}(", function_name),
        format!("function {}(", function_name),
        format!("func {}(", function_name),
    ]
}

/// Candidate anchors for a type's constructor.
fn constructor_anchor_candidates() -> Vec<String> {
    vec![
        "fn new(".to_string(),
        "def __init__(".to_string(),
        "constructor(".to_string(),
    ]
}

/// Tries each candidate anchor in order against `source`, returning the
/// first one present.
fn find_anchor<'a>(source: &str, candidates: &'a [String]) -> Option<&'a str> {
    candidates.iter().find(|c| source.contains(c.as_str())).map(|c| c.as_str())
}

fn read_source(path: &str) -> Result<(PathBuf, String), Value> {
    let path_obj = PathBuf::from(path);
    if !path_obj.is_file() {
        return Err(json!(format!("Error: File not found at path '{}'", path)));
    }
    match fs::read_to_string(&path_obj) {
        Ok(content) => Ok((path_obj, content)),
        Err(e) => Err(json!(format!("Error: could not read '{}': {}", path, e))),
    }
}

sync_action!(AddImportAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let import_line = str_arg(args, "import").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    if source.lines().any(|l| l.trim() == import_line.trim()) {
        return Ok(json!(format!("Import '{}' already present in '{}'.", import_line, path)));
    }
    let updated = format!("{}\n{}", import_line, source);
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully added import '{}' to '{}'.", import_line, path)))
});

sync_action!(AddFunctionToFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let function_code = str_arg(args, "function_code").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let mut updated = source;
    if !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push('\n');
    updated.push_str(function_code);
    if !function_code.ends_with('\n') {
        updated.push('\n');
    }
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully appended function to '{}'.", path)))
});

sync_action!(AddClassToFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let class_code = str_arg(args, "class_code").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let mut updated = source;
    if !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push('\n');
    updated.push_str(class_code);
    if !class_code.ends_with('\n') {
        updated.push('\n');
    }
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully appended type definition to '{}'.", path)))
});

sync_action!(AddMethodToClassAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let class_name = str_arg(args, "class_name").unwrap_or_default();
    let method_code = str_arg(args, "method_code").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let candidates = class_anchor_candidates(class_name);
    let anchor = match find_anchor(&source, &candidates) {
        Some(a) => a.to_string(),
        None => {
            return Ok(json!(format!(
                "Error: could not find a class/impl block named '{}' in '{}' to add method.",
                class_name, path
            )))
        }
    };
    let updated = insert_after_anchor(&source, &anchor, method_code).unwrap();
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully added method to '{}' in '{}'.", class_name, path)))
});

sync_action!(AddParameterToFunctionAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let function_name = str_arg(args, "function_name").unwrap_or_default();
    let parameter = str_arg(args, "parameter").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let candidates = function_anchor_candidates(function_name);
    let (anchor, idx) = match candidates.iter().find_map(|c| source.find(c.as_str()).map(|i| (c, i))) {
        Some((anchor, idx)) => (anchor, idx),
        None => return Ok(json!(format!("Error: function '{}' not found in '{}'.", function_name, path))),
    };
    let open_paren = idx + anchor.len() - 1;
    let close_paren = match source[open_paren..].find(')') {
        Some(o) => open_paren + o,
        None => return Ok(json!(format!("Error: malformed signature for '{}' in '{}'.", function_name, path))),
    };
    let has_params = source[open_paren + 1..close_paren].trim() != "";
    let insertion = if has_params {
        format!(", {}", parameter)
    } else {
        parameter.to_string()
    };
    let mut updated = source.clone();
    updated.insert_str(close_paren, &insertion);
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!(
        "Successfully added parameter '{}' to '{}' in '{}'.",
        parameter, function_name, path
    )))
});

sync_action!(AddAttributeToInitAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let attribute_code = str_arg(args, "attribute_code").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let candidates = constructor_anchor_candidates();
    let anchor = match find_anchor(&source, &candidates) {
        Some(a) => a.to_string(),
        None => return Ok(json!(format!("Error: could not find a constructor in '{}'.", path))),
    };
    let updated = insert_after_anchor(&source, &anchor, attribute_code).unwrap();
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully added attribute initialization in '{}'.", path)))
});

sync_action!(AddDecoratorToFunctionAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let function_name = str_arg(args, "function_name").unwrap_or_default();
    let decorator = str_arg(args, "decorator").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    let candidates = function_anchor_candidates(function_name);
    let anchor = match find_anchor(&source, &candidates) {
        Some(a) => a.to_string(),
        None => return Ok(json!(format!("Error: function '{}' not found in '{}'.", function_name, path))),
    };
    let updated = insert_before_line_containing(&source, &anchor, decorator).unwrap();
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!(
        "Successfully added '{}' above '{}' in '{}'.",
        decorator, function_name, path
    )))
});

fn insert_before_line_containing(source: &str, needle: &str, insertion: &str) -> Option<String> {
    let idx = source.find(needle)?;
    let line_start = source[..idx].rfind('\n').map(|o| o + 1).unwrap_or(0);
    let mut out = String::with_capacity(source.len() + insertion.len() + 1);
    out.push_str(&source[..line_start]);
    out.push_str(insertion);
    out.push('\n');
    out.push_str(&source[line_start..]);
    Some(out)
}

sync_action!(RenameSymbolInFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let old_name = str_arg(args, "old_name").unwrap_or_default();
    let new_name = str_arg(args, "new_name").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    if old_name.is_empty() {
        return Ok(json!("Error: old_name must not be empty."));
    }
    let occurrences = source.matches(old_name).count();
    if occurrences == 0 {
        return Ok(json!(format!("Error: symbol '{}' not found in '{}'.", old_name, path)));
    }
    let updated = source.replace(old_name, new_name);
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!(
        "Successfully renamed {} occurrence(s) of '{}' to '{}' in '{}'.",
        occurrences, old_name, new_name, path
    )))
});

sync_action!(ReplaceNodeInFileAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let old_text = str_arg(args, "old_text").unwrap_or_default();
    let new_text = str_arg(args, "new_text").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    if !source.contains(old_text) {
        return Ok(json!(format!("Error: text to replace not found in '{}'.", path)));
    }
    let updated = source.replacen(old_text, new_text, 1);
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully replaced node in '{}'.", path)))
});

sync_action!(ReplaceMethodInClassAction, |args, _root, _services| {
    let path = str_arg(args, "path").unwrap_or_default();
    let old_method_code = str_arg(args, "old_method_code").unwrap_or_default();
    let new_method_code = str_arg(args, "new_method_code").unwrap_or_default();
    let (path_obj, source) = match read_source(path) {
        Ok(v) => v,
        Err(e) => return Ok(e),
    };
    if !source.contains(old_method_code) {
        return Ok(json!(format!("Error: method body not found in '{}'.", path)));
    }
    let updated = source.replacen(old_method_code, new_method_code, 1);
    fs::write(&path_obj, updated).map_err(|e| AuraError::ToolFailure(e.to_string()))?;
    Ok(json!(format!("Successfully replaced method in '{}'.", path)))
});

// -- run_shell_command: confined to the project root via current_dir --

struct RunShellCommandAction;
#[async_trait]
impl ToolAction for RunShellCommandAction {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        project_root: &Path,
        _user_id: &str,
        _services: &ServiceBundle,
    ) -> Result<Value, AuraError> {
        let command = str_arg(args, "command").unwrap_or_default();
        if command.trim().is_empty() {
            return Ok(json!("Error: no command provided."));
        }
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AuraError::ToolFailure(format!("failed to spawn shell: {}", e)))?;

        const MAX_OUTPUT_BYTES: usize = 64 * 1024;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if combined.len() > MAX_OUTPUT_BYTES {
            combined.truncate(MAX_OUTPUT_BYTES);
            combined.push_str("\n...[output truncated]");
        }
        if output.status.success() {
            Ok(json!(combined))
        } else {
            Ok(json!(format!(
                "Error: command exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                combined
            )))
        }
    }
}

// -- meta tools --

struct RequestUserInputAction;
#[async_trait]
impl ToolAction for RequestUserInputAction {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        _project_root: &Path,
        user_id: &str,
        services: &ServiceBundle,
    ) -> Result<Value, AuraError> {
        let question = str_arg(args, "question").unwrap_or("The agent needs clarification to proceed.");
        services
            .notification_bus
            .broadcast_to_user(user_id, crate::aura::notification::Event::system_log(question.to_string()));
        Ok(json!(format!("Error: awaiting user input: {}", question)))
    }
}

struct CreateNewToolAction;
#[async_trait]
impl ToolAction for CreateNewToolAction {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        _project_root: &Path,
        _user_id: &str,
        _services: &ServiceBundle,
    ) -> Result<Value, AuraError> {
        let name = str_arg(args, "name").unwrap_or_default();
        Ok(json!(format!(
            "Error: dynamic tool registration is not supported; '{}' cannot be created at runtime.",
            name
        )))
    }
}

struct IndexProjectContextAction;
#[async_trait]
impl ToolAction for IndexProjectContextAction {
    async fn execute(
        &self,
        _args: &Map<String, Value>,
        _project_root: &Path,
        _user_id: &str,
        services: &ServiceBundle,
    ) -> Result<Value, AuraError> {
        let count = services
            .project_manager
            .as_ref()
            .map(|pm| pm.project_files().len())
            .unwrap_or(0);
        Ok(json!(format!("Successfully indexed {} project file(s).", count)))
    }
}

/// Builds the process-wide tool catalog, registering every required
/// tool named in the component design.
pub fn build_catalog() -> ToolCatalog {
    let mut catalog = ToolCatalog::new();

    catalog.register(ToolDescriptor {
        name: "write_file",
        description: "Writes content to a file, creating parent directories as needed.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(WriteFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "append_to_function",
        description: "Appends content to the end of an existing file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AppendToFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "read_file",
        description: "Reads the content of a file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: false,
        action: Arc::new(ReadFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "list_files",
        description: "Lists files and directories at a given path.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: false,
        action: Arc::new(ListFilesAction),
    });
    catalog.register(ToolDescriptor {
        name: "create_directory",
        description: "Creates a new, empty directory.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(CreateDirectoryAction),
    });
    catalog.register(ToolDescriptor {
        name: "create_package_init",
        description: "Initializes a directory as a module by creating its entry file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(CreatePackageInitAction),
    });
    catalog.register(ToolDescriptor {
        name: "delete_directory",
        description: "Recursively deletes a directory and all its contents.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(DeleteDirectoryAction),
    });
    catalog.register(ToolDescriptor {
        name: "delete_file",
        description: "Deletes a single file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(DeleteFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "copy_file",
        description: "Copies a file from a source to a destination.",
        parameters_schema: json!({"type": "object", "properties": {"source_path": {"type": "string"}, "destination_path": {"type": "string"}}, "required": ["source_path", "destination_path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["source_path", "destination_path"]),
        mutates_workspace: true,
        action: Arc::new(CopyFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "move_file",
        description: "Moves or renames a file.",
        parameters_schema: json!({"type": "object", "properties": {"source_path": {"type": "string"}, "destination_path": {"type": "string"}}, "required": ["source_path", "destination_path"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["source_path", "destination_path"]),
        mutates_workspace: true,
        action: Arc::new(MoveFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_dependency_to_requirements",
        description: "Adds a dependency to the project's dependency manifest, deduplicating by package name.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "dependency": {"type": "string"}}, "required": ["dependency"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddDependencyToRequirementsAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_import",
        description: "Adds an import/use statement to the top of a file if not already present.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "import": {"type": "string"}}, "required": ["path", "import"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddImportAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_function_to_file",
        description: "Appends a new function definition to a file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "function_code": {"type": "string"}}, "required": ["path", "function_code"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddFunctionToFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_class_to_file",
        description: "Appends a new type/class definition to a file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "class_code": {"type": "string"}}, "required": ["path", "class_code"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddClassToFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_method_to_class",
        description: "Adds a method to an existing class/impl block.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "class_name": {"type": "string"}, "method_code": {"type": "string"}}, "required": ["path", "class_name", "method_code"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddMethodToClassAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_parameter_to_function",
        description: "Adds a parameter to an existing function's signature.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "function_name": {"type": "string"}, "parameter": {"type": "string"}}, "required": ["path", "function_name", "parameter"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddParameterToFunctionAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_attribute_to_init",
        description: "Adds a field initialization to a type's constructor.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "attribute_code": {"type": "string"}}, "required": ["path", "attribute_code"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddAttributeToInitAction),
    });
    catalog.register(ToolDescriptor {
        name: "add_decorator_to_function",
        description: "Adds an attribute/decorator line above a function definition.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "function_name": {"type": "string"}, "decorator": {"type": "string"}}, "required": ["path", "function_name", "decorator"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(AddDecoratorToFunctionAction),
    });
    catalog.register(ToolDescriptor {
        name: "rename_symbol_in_file",
        description: "Renames every occurrence of a symbol within a single file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "old_name": {"type": "string"}, "new_name": {"type": "string"}}, "required": ["path", "old_name", "new_name"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(RenameSymbolInFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "replace_node_in_file",
        description: "Replaces one occurrence of a literal text span in a file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "old_text": {"type": "string"}, "new_text": {"type": "string"}}, "required": ["path", "old_text", "new_text"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(ReplaceNodeInFileAction),
    });
    catalog.register(ToolDescriptor {
        name: "replace_method_in_class",
        description: "Replaces one method's body within a file.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "old_method_code": {"type": "string"}, "new_method_code": {"type": "string"}}, "required": ["path", "old_method_code", "new_method_code"]}),
        required_services: services(&[]),
        path_param_keys: path_set(&["path"]),
        mutates_workspace: true,
        action: Arc::new(ReplaceMethodInClassAction),
    });
    catalog.register(ToolDescriptor {
        name: "run_shell_command",
        description: "Runs a shell command with the project root as its working directory.",
        parameters_schema: json!({"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]}),
        required_services: services(&[]),
        path_param_keys: HashSet::new(),
        mutates_workspace: false,
        action: Arc::new(RunShellCommandAction),
    });
    catalog.register(ToolDescriptor {
        name: "request_user_input",
        description: "Asks the user a clarifying question and stalls the task pending an answer.",
        parameters_schema: json!({"type": "object", "properties": {"question": {"type": "string"}}, "required": ["question"]}),
        required_services: services(&[RequiredService::NotificationBus]),
        path_param_keys: HashSet::new(),
        mutates_workspace: false,
        action: Arc::new(RequestUserInputAction),
    });
    catalog.register(ToolDescriptor {
        name: "create_new_tool",
        description: "Meta-tool placeholder: dynamic tool creation is not supported by this core.",
        parameters_schema: json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}),
        required_services: services(&[]),
        path_param_keys: HashSet::new(),
        mutates_workspace: false,
        action: Arc::new(CreateNewToolAction),
    });
    catalog.register(ToolDescriptor {
        name: "index_project_context",
        description: "Populates the vector-context index for the active project.",
        parameters_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        required_services: services(&[RequiredService::ProjectManager]),
        path_param_keys: HashSet::new(),
        mutates_workspace: false,
        action: Arc::new(IndexProjectContextAction),
    });

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aura::notification::NotificationBus;

    fn bundle() -> ServiceBundle {
        ServiceBundle {
            project_manager: None,
            mission_log: None,
            vector_context: None,
            llm_gateway: None,
            notification_bus: NotificationBus::new(),
        }
    }

    #[tokio::test]
    async fn write_file_rejects_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let action = WriteFileAction;
        let mut args = Map::new();
        args.insert(
            "path".to_string(),
            json!(dir.path().join("x.txt").to_string_lossy().into_owned()),
        );
        args.insert("content".to_string(), json!("   "));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn write_file_then_read_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("hello.txt");
        let write = WriteFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("content".to_string(), json!("hello world"));
        let result = write.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));

        let read = ReadFileAction;
        let mut read_args = Map::new();
        read_args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        let content = read.execute(&read_args, dir.path(), "u1", &bundle()).await.unwrap();
        assert_eq!(content.as_str().unwrap(), "hello world");
    }

    #[tokio::test]
    async fn append_to_file_appends_and_reports_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("log.txt");
        fs::write(&target, "first\n").unwrap();
        let action = AppendToFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("content".to_string(), json!("second"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert_eq!(content, "first\nsecond");

        let missing = dir.path().join("nope.txt");
        let mut missing_args = Map::new();
        missing_args.insert("path".to_string(), json!(missing.to_string_lossy().into_owned()));
        missing_args.insert("content".to_string(), json!("x"));
        let missing_result = action.execute(&missing_args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(missing_result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn list_files_reports_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        let action = ListFilesAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(dir.path().to_string_lossy().into_owned()));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        let text = result.as_str().unwrap();
        assert!(text.find("a.txt").unwrap() < text.find("b.txt").unwrap());
    }

    #[tokio::test]
    async fn create_directory_then_delete_directory_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("pkg");
        let create = CreateDirectoryAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        let result = create.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        assert!(target.is_dir());

        let delete = DeleteDirectoryAction;
        let del_result = delete.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(del_result.as_str().unwrap().starts_with("Successfully"));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn create_package_init_writes_mod_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("widgets");
        let action = CreatePackageInitAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        assert!(target.join("mod.rs").is_file());
    }

    #[tokio::test]
    async fn copy_file_then_move_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let copy_dest = dir.path().join("b.txt");
        let copy = CopyFileAction;
        let mut copy_args = Map::new();
        copy_args.insert("source_path".to_string(), json!(source.to_string_lossy().into_owned()));
        copy_args.insert("destination_path".to_string(), json!(copy_dest.to_string_lossy().into_owned()));
        let copy_result = copy.execute(&copy_args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(copy_result.as_str().unwrap().starts_with("Successfully"));
        assert!(copy_dest.is_file());

        let move_dest = dir.path().join("c.txt");
        let mv = MoveFileAction;
        let mut move_args = Map::new();
        move_args.insert("source_path".to_string(), json!(copy_dest.to_string_lossy().into_owned()));
        move_args.insert("destination_path".to_string(), json!(move_dest.to_string_lossy().into_owned()));
        let move_result = mv.execute(&move_args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(move_result.as_str().unwrap().starts_with("Successfully"));
        assert!(!copy_dest.exists());
        assert!(move_dest.is_file());
    }

    #[tokio::test]
    async fn delete_file_reports_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("ghost.txt");
        let action = DeleteFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(missing.to_string_lossy().into_owned()));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn add_dependency_deduplicates_by_package_name() {
        let dir = tempfile::tempdir().unwrap();
        let req_path = dir.path().join("requirements.txt");
        fs::write(&req_path, "flask==2.0.0\n").unwrap();
        let action = AddDependencyToRequirementsAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(req_path.to_string_lossy().into_owned()));
        args.insert("dependency".to_string(), json!("flask==3.0.0"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn add_dependency_appends_new_package() {
        let dir = tempfile::tempdir().unwrap();
        let req_path = dir.path().join("requirements.txt");
        let action = AddDependencyToRequirementsAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(req_path.to_string_lossy().into_owned()));
        args.insert("dependency".to_string(), json!("pytest==7.4.0"));
        action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        let content = fs::read_to_string(&req_path).unwrap();
        assert!(content.contains("pytest==7.4.0"));
    }

    #[tokio::test]
    async fn add_import_skips_duplicate_import() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "use std::fmt;\nfn foo() {}\n").unwrap();
        let action = AddImportAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("import".to_string(), json!("use std::fmt;"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().contains("already present"));
    }

    #[tokio::test]
    async fn add_function_to_file_appends_code() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "fn foo() {}\n").unwrap();
        let action = AddFunctionToFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("function_code".to_string(), json!("fn bar() {}"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("fn bar() {}"));
    }

    #[tokio::test]
    async fn add_class_to_file_appends_code() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "fn foo() {}\n").unwrap();
        let action = AddClassToFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("class_code".to_string(), json!("struct Widget;"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("struct Widget;"));
    }

    #[tokio::test]
    async fn add_method_to_class_finds_python_class_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("widget.py");
        fs::write(&target, "class Widget:\n    def __init__(self):\n        pass\n").unwrap();
        let action = AddMethodToClassAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("class_name".to_string(), json!("Widget"));
        args.insert("method_code".to_string(), json!("    def draw(self):\n        pass"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("def draw(self):"));
    }

    #[tokio::test]
    async fn add_method_to_class_finds_rust_impl_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("widget.rs");
        fs::write(&target, "struct Widget;\nimpl Widget {\n}\n").unwrap();
        let action = AddMethodToClassAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("class_name".to_string(), json!("Widget"));
        args.insert("method_code".to_string(), json!("    fn draw(&self) {}"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("fn draw(&self) {}"));
    }

    #[tokio::test]
    async fn add_parameter_to_function_finds_python_def_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("main.py");
        fs::write(&target, "def greet(name):\n    print(name)\n").unwrap();
        let action = AddParameterToFunctionAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("function_name".to_string(), json!("greet"));
        args.insert("parameter".to_string(), json!("loud"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("def greet(name, loud):"));
    }

    #[tokio::test]
    async fn add_attribute_to_init_finds_python_constructor_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("widget.py");
        fs::write(&target, "class Widget:\n    def __init__(self):\n        self.name = \"w\"\n").unwrap();
        let action = AddAttributeToInitAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("attribute_code".to_string(), json!("        self.color = \"red\""));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains("self.color = \"red\""));
    }

    #[tokio::test]
    async fn add_decorator_to_function_finds_js_function_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.js");
        fs::write(&target, "function handler() {\n  return 1;\n}\n").unwrap();
        let action = AddDecoratorToFunctionAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("function_name".to_string(), json!("handler"));
        args.insert("decorator".to_string(), json!("// @logged"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        let decorator_line = content.lines().position(|l| l.contains("@logged")).unwrap();
        let function_line = content.lines().position(|l| l.contains("function handler(")).unwrap();
        assert!(decorator_line < function_line);
    }

    #[tokio::test]
    async fn rename_symbol_reports_missing_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "fn foo() {}\n").unwrap();
        let action = RenameSymbolInFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("old_name".to_string(), json!("bar"));
        args.insert("new_name".to_string(), json!("baz"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn replace_node_in_file_replaces_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "let x = 1;\nlet x = 1;\n").unwrap();
        let action = ReplaceNodeInFileAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("old_text".to_string(), json!("let x = 1;"));
        args.insert("new_text".to_string(), json!("let x = 2;"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Successfully"));
        let content = fs::read_to_string(&target).unwrap();
        assert_eq!(content, "let x = 2;\nlet x = 1;\n");
    }

    #[tokio::test]
    async fn replace_method_in_class_reports_missing_body() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        fs::write(&target, "impl Widget {\n    fn draw(&self) {}\n}\n").unwrap();
        let action = ReplaceMethodInClassAction;
        let mut args = Map::new();
        args.insert("path".to_string(), json!(target.to_string_lossy().into_owned()));
        args.insert("old_method_code".to_string(), json!("fn missing(&self) {}"));
        args.insert("new_method_code".to_string(), json!("fn missing(&self) { todo!() }"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn run_shell_command_reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let action = RunShellCommandAction;
        let mut args = Map::new();
        args.insert("command".to_string(), json!("exit 1"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn run_shell_command_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let action = RunShellCommandAction;
        let mut args = Map::new();
        args.insert("command".to_string(), json!("echo hi"));
        let result = action.execute(&args, dir.path(), "u1", &bundle()).await.unwrap();
        assert_eq!(result.as_str().unwrap().trim(), "hi");
    }

    #[tokio::test]
    async fn request_user_input_broadcasts_to_the_real_user() {
        let dir = tempfile::tempdir().unwrap();
        let bus = NotificationBus::new();
        let mut rx = bus.connect("u1", "c1");
        let bundle = ServiceBundle {
            project_manager: None,
            mission_log: None,
            vector_context: None,
            llm_gateway: None,
            notification_bus: bus,
        };
        let action = RequestUserInputAction;
        let mut args = Map::new();
        args.insert("question".to_string(), json!("which port?"));
        let result = action.execute(&args, dir.path(), "u1", &bundle).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("Error: awaiting user input"));
        let event = rx.recv().await.unwrap();
        match event {
            crate::aura::notification::Event::SystemLog { content, .. } => {
                assert_eq!(content, "which port?");
            }
            _ => panic!("unexpected event shape"),
        }
    }

    #[tokio::test]
    async fn index_project_context_reports_file_count() {
        let dir = tempfile::tempdir().unwrap();
        struct FakeProjectManager;
        impl crate::aura::tools::ProjectManager for FakeProjectManager {
            fn project_files(&self) -> Vec<String> {
                vec!["a.rs".to_string(), "b.rs".to_string()]
            }
        }
        let bundle = ServiceBundle {
            project_manager: Some(Arc::new(FakeProjectManager)),
            mission_log: None,
            vector_context: None,
            llm_gateway: None,
            notification_bus: NotificationBus::new(),
        };
        let action = IndexProjectContextAction;
        let args = Map::new();
        let result = action.execute(&args, dir.path(), "u1", &bundle).await.unwrap();
        assert!(result.as_str().unwrap().contains("2 project file"));
    }

    #[test]
    fn build_catalog_registers_all_required_tools() {
        let catalog = build_catalog();
        for name in [
            "write_file",
            "add_dependency_to_requirements",
            "create_package_init",
            "create_directory",
            "delete_directory",
            "delete_file",
            "copy_file",
            "move_file",
            "read_file",
            "list_files",
            "run_shell_command",
            "add_function_to_file",
            "add_class_to_file",
            "add_method_to_class",
            "add_import",
            "add_parameter_to_function",
            "add_attribute_to_init",
            "add_decorator_to_function",
            "rename_symbol_in_file",
            "append_to_function",
            "replace_node_in_file",
            "replace_method_in_class",
            "request_user_input",
            "create_new_tool",
            "index_project_context",
        ] {
            assert!(catalog.get(name).is_some(), "missing tool: {}", name);
        }
    }
}
