//! Tab completion over command names and directory entries.

use crate::vfs::FileSystem;

pub struct CompletionEnv<'a> {
    pub command_names: &'a [String],
    pub fs: &'a dyn FileSystem,
    pub cwd: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    None,
    /// Text to insert at the cursor.
    Insert(String),
    /// Candidates diverge at the typed text; show them all.
    List(Vec<String>),
}

/// Complete the token ending at the cursor. `before_cursor` is the edit
/// buffer up to the cursor.
pub fn complete(before_cursor: &str, env: &CompletionEnv<'_>) -> Completion {
    let token_start = before_cursor.rfind(' ').map_or(0, |i| i + 1);
    let token = &before_cursor[token_start..];
    let first_word = before_cursor[..token_start].trim().is_empty();

    if first_word {
        let candidates: Vec<String> = env.command_names.iter().filter(|n| n.starts_with(token)).cloned().collect();
        resolve(token, candidates, " ")
    } else {
        let (dir_part, prefix) = match token.rfind('/') {
            Some(i) => (&token[..=i], &token[i + 1..]),
            None => ("", token),
        };
        let dir = if dir_part.is_empty() { env.cwd.to_string() } else { env.fs.resolve_path(env.cwd, dir_part) };
        let Some(entries) = env.fs.list_dir(&dir) else { return Completion::None };
        let candidates: Vec<String> = entries
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| {
                let is_dir = env.fs.is_directory(&env.fs.resolve_path(&dir, &name));
                if is_dir { format!("{name}/") } else { name }
            })
            .collect();
        resolve(prefix, candidates, "")
    }
}

fn resolve(typed: &str, candidates: Vec<String>, single_suffix: &str) -> Completion {
    match candidates.len() {
        0 => Completion::None,
        1 => Completion::Insert(format!("{}{}", &candidates[0][typed.len()..], single_suffix)),
        _ => {
            let lcp = longest_common_prefix(&candidates);
            if lcp.chars().count() > typed.chars().count() {
                Completion::Insert(lcp[typed.len()..].to_string())
            } else {
                Completion::List(candidates)
            }
        }
    }
}

pub fn longest_common_prefix(items: &[String]) -> String {
    let Some(first) = items.first() else { return String::new() };
    let mut end = first.len();
    for item in &items[1..] {
        end = first
            .char_indices()
            .zip(item.chars())
            .find(|((_, a), b)| a != b)
            .map_or(end.min(item.len()), |((i, _), _)| i.min(end));
    }
    first[..end].to_string()
}
