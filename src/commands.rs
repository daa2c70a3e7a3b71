//! Shell commands and name resolution

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "me",
    aliases: &["whoami", "auth"],
    usage: "me",
    description: "Show the authenticated user",
  },
  Command {
    name: "projects",
    aliases: &["p", "project"],
    usage: "projects",
    description: "List projects",
  },
  Command {
    name: "new-project",
    aliases: &["np"],
    usage: "new-project [name]",
    description: "Create a project",
  },
  Command {
    name: "tasks",
    aliases: &["t", "task"],
    usage: "tasks <projectId>",
    description: "List the tasks of a project",
  },
  Command {
    name: "user-tasks",
    aliases: &["ut", "mine"],
    usage: "user-tasks <userId>",
    description: "List tasks authored by or assigned to a user",
  },
  Command {
    name: "new-task",
    aliases: &["nt"],
    usage: "new-task <projectId> <title>",
    description: "Create a task",
  },
  Command {
    name: "status",
    aliases: &["st", "move"],
    usage: "status <taskId> <status>",
    description: "Change the status of a task",
  },
  Command {
    name: "users",
    aliases: &["u", "user"],
    usage: "users",
    description: "List users",
  },
  Command {
    name: "teams",
    aliases: &["team"],
    usage: "teams",
    description: "List teams",
  },
  Command {
    name: "search",
    aliases: &["s", "find"],
    usage: "search <text>",
    description: "Search tasks, projects and users",
  },
  Command {
    name: "cache",
    aliases: &["c", "entries"],
    usage: "cache",
    description: "Show cache entries and their state",
  },
  Command {
    name: "invalidate",
    aliases: &["inv"],
    usage: "invalidate <Type[:id]>...",
    description: "Invalidate cache entries by tag",
  },
  Command {
    name: "watch",
    aliases: &["w"],
    usage: "watch <projectId>",
    description: "Observe a project's tasks and report re-fetches",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit taskboard",
  },
];

/// Get suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  ranked(input).into_iter().map(|(cmd, _)| cmd).collect()
}

/// Commands in the best-ranked tier for `input`: exact name, alias, name
/// prefix, alias prefix, name substring, alias substring.
pub fn best_matches(input: &str) -> Vec<&'static Command> {
  let matches = ranked(input);
  let Some(&(_, best)) = matches.first() else {
    return Vec::new();
  };

  matches
    .into_iter()
    .take_while(|(_, priority)| *priority == best)
    .map(|(cmd, _)| cmd)
    .collect()
}

/// Resolve user input to a single command, when the best-ranked tier holds
/// exactly one.
pub fn resolve(input: &str) -> Option<&'static Command> {
  if input.is_empty() {
    return None;
  }

  match best_matches(input).as_slice() {
    [only] => Some(only),
    _ => None,
  }
}

fn ranked(input: &str) -> Vec<(&'static Command, u32)> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().map(|cmd| (cmd, 0)).collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Stable sort keeps table order within a priority
  matches.sort_by_key(|(_, priority)| *priority);
  matches
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("tasks");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "tasks");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("t");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "tasks");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("proj");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "projects");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("valid");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "invalidate");
  }

  #[test]
  fn test_resolve_prefers_exact_alias() {
    assert_eq!(resolve("s").map(|c| c.name), Some("search"));
    assert_eq!(resolve("?").map(|c| c.name), Some("help"));
  }

  #[test]
  fn test_resolve_unambiguous_prefix() {
    assert_eq!(resolve("sta").map(|c| c.name), Some("status"));
    assert_eq!(resolve("qui").map(|c| c.name), Some("quit"));
  }

  #[test]
  fn test_resolve_prefix_beats_substring() {
    // "new-project" and "user-tasks" only contain these
    assert_eq!(resolve("proj").map(|c| c.name), Some("projects"));
    assert_eq!(resolve("tas").map(|c| c.name), Some("tasks"));
  }

  #[test]
  fn test_best_matches_reports_only_top_tier() {
    let names: Vec<&str> = best_matches("new").iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["new-project", "new-task"]);
    assert!(best_matches("zzz").is_empty());
  }

  #[test]
  fn test_resolve_ambiguous_is_none() {
    // "new-project" and "new-task"
    assert!(resolve("new").is_none());
    assert!(resolve("").is_none());
    assert!(resolve("zzz").is_none());
  }
}
