/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Formation overview",
  },
  Command {
    name: "personnel",
    aliases: &["p", "staff", "formators"],
    description: "Formators and directors",
  },
  Command {
    name: "confreres",
    aliases: &["c", "formation"],
    description: "Confreres in formation",
  },
  Command {
    name: "signout",
    aliases: &["logout"],
    description: "Forget cached data for this user",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit formation-portal",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let needle = input.trim().to_lowercase();
  if needle.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut ranked: Vec<(&Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &needle).map(|rank| (cmd, rank)))
    .collect();

  // Stable: equal ranks keep declaration order
  ranked.sort_by_key(|(_, rank)| *rank);
  ranked.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` means no match.
fn match_rank(cmd: &Command, needle: &str) -> Option<u8> {
  let aliases = || cmd.aliases.iter();

  if cmd.name == needle {
    Some(0)
  } else if aliases().any(|a| *a == needle) {
    Some(1)
  } else if cmd.name.starts_with(needle) {
    Some(2)
  } else if aliases().any(|a| a.starts_with(needle)) {
    Some(3)
  } else if cmd.name.contains(needle) || aliases().any(|a| a.contains(needle)) {
    Some(4)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    assert_eq!(get_suggestions("signout")[0].name, "signout");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("p")[0].name, "personnel");
    assert_eq!(get_suggestions("logout")[0].name, "signout");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("conf")[0].name, "confreres");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("sonn");
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].name, "personnel");
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }
}
