//! Plain-text replies for the read-only commands.

pub(crate) fn help_text() -> String {
    [
        "Commands:",
        "/help",
        "/ask <text>",
        "/ai <preset> <text>",
        "/ai_list",
        "Admin:",
        "/ai_preset_add <name> <provider> <model> <system_prompt...>",
        "/ai_preset_del <name>",
        "/ai_default <name>",
        "/llm_add",
        "/llm_list",
        "/llm_del <name>",
        "Private wizard:",
        "/start llmadd_<chat_id>",
        "/cancel",
    ]
    .join("\n")
}

pub(crate) fn menu_text(chat_kind: &str, access_mode: &str) -> String {
    [
        "HyprBot menu".to_string(),
        String::new(),
        "Quick commands:".to_string(),
        "/ask <text> - ask using default preset".to_string(),
        "/ai <preset> <text> - ask using explicit preset".to_string(),
        "/ai_list - list chat presets".to_string(),
        "/status - chat status".to_string(),
        String::new(),
        "Admin commands (group/supergroup):".to_string(),
        "/llm_add, /llm_list, /llm_del".to_string(),
        "/ai_preset_add, /ai_preset_del, /ai_default".to_string(),
        String::new(),
        format!("Chat type: {chat_kind}"),
        format!("Access mode: {access_mode}"),
    ]
    .join("\n")
}

pub(crate) fn setup_text() -> String {
    [
        "Setup flow for a new group:",
        "1) In the group run /llm_add",
        "2) Open the private deep-link from the bot message",
        "3) Finish provider wizard in private chat",
        "4) Back in group, create preset:",
        "   /ai_preset_add <name> <provider> <model> <system_prompt...>",
        "5) Set default preset: /ai_default <name>",
        "6) Ask: /ask <text>",
    ]
    .join("\n")
}

pub(crate) fn status_text(
    chat_id: i64,
    chat_kind: &str,
    providers: usize,
    presets: usize,
    default_preset: Option<&str>,
    access_mode: &str,
) -> String {
    [
        "Chat status".to_string(),
        format!("chat_id: {chat_id}"),
        format!("chat_type: {chat_kind}"),
        format!("providers: {providers}"),
        format!("presets: {presets}"),
        format!("default_preset: {}", default_preset.unwrap_or("<not set>")),
        format!("access_mode: {access_mode}"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        let text = status_text(111, "group", 2, 3, Some("grok_default"), "public");
        assert!(text.contains("chat_id: 111"));
        assert!(text.contains("providers: 2"));
        assert!(text.contains("default_preset: grok_default"));

        let text = status_text(111, "group", 0, 0, None, "private");
        assert!(text.contains("default_preset: <not set>"));
        assert!(text.contains("access_mode: private"));
    }

    #[test]
    fn help_lists_every_command() {
        let text = help_text();
        for command in [
            "/help", "/ask", "/ai ", "/ai_list", "/ai_preset_add", "/ai_preset_del",
            "/ai_default", "/llm_add", "/llm_list", "/llm_del", "/start", "/cancel",
        ] {
            assert!(text.contains(command), "missing {command}");
        }
    }
}
