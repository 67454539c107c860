use super::types::{Policy, PolicyRule};

/// Built-in safety policy used when no policy file is available
pub fn default_policy() -> Policy {
    Policy {
        allow_apply: true,
        critical: critical_rules(),
        auto_disable: auto_disable_rules(),
        optional_hints: optional_hint_rules(),
    }
}

fn critical_rules() -> Vec<PolicyRule> {
    vec![
        // Security
        rule("defender", "Security component: do not touch"),
        rule("securityhealth", "Security component: do not touch"),
        rule("security", "Protection in place"),
        rule("antivirus", "Protection in place"),
        // Graphics and platform drivers
        rule("nvidia", "GPU driver"),
        rule("amd", "GPU driver"),
        rule("radeon", "GPU driver"),
        rule("intel", "Platform driver"),
        // Audio
        rule("realtek", "Audio driver"),
        rule("audio", "Audio driver"),
        // Input
        rule("synaptics", "Input driver"),
        rule("elan", "Input driver"),
        rule("touchpad", "Input driver"),
        rule("keyboard", "Keyboard driver"),
        rule("mouse", "Mouse driver"),
        // Network
        rule("network", "Network driver"),
        rule("wifi", "Network driver"),
        rule("ethernet", "Network driver"),
        rule("bluetooth", "Network driver"),
        // OS components. Bare "windows" is left out: every startup folder
        // and Run key path contains it.
        rule("system32", "Windows component"),
        rule("ctfmon", "Windows component"),
    ]
}

fn auto_disable_rules() -> Vec<PolicyRule> {
    vec![
        rule("updater", "Unneeded at startup: update utility"),
        rule("update", "Unneeded at startup: update utility"),
        rule("auto-update", "Silent update, not critical"),
        rule("helper", "Optional background helper"),
        rule("assistant", "Non-essential assistant"),
        rule("launcher", "Launcher not needed at boot"),
    ]
}

fn optional_hint_rules() -> Vec<PolicyRule> {
    vec![
        rule("cloud", "Cloud sync can wait"),
        rule("onedrive", "Cloud sync can wait"),
        rule("dropbox", "Cloud sync can wait"),
        rule("drive", "Cloud sync can wait"),
        rule("teams", "Work messaging is optional"),
        rule("slack", "Work messaging is optional"),
        rule("discord", "Gaming chat is optional"),
        rule("zoom", "Video calls are optional"),
        rule("spotify", "Music playback is not critical"),
        rule("steam", "Gaming component is optional"),
        rule("game", "Gaming component is optional"),
        rule("overlay", "Overlay is optional"),
    ]
}

fn rule(keyword: &str, reason: &str) -> PolicyRule {
    PolicyRule::new(keyword, reason)
}
