//! Deterministic classification of targets and tools.
//!
//! Static tables drive plan generation: which command templates a target
//! category gets, which task type a tool belongs to, how long it is expected
//! to run, and which mode modifiers it accepts.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::{ScanMode, TaskType};

static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}(/\d{1,2})?$").unwrap());
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z]{2,})+$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCategory {
    Ip,
    Url,
    Path,
    Domain,
}

impl TargetCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetCategory::Ip => "ip",
            TargetCategory::Url => "url",
            TargetCategory::Path => "path",
            TargetCategory::Domain => "domain",
        }
    }
}

impl fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a target string.
///
/// Precedence: IPv4/CIDR, then `http://`/`https://`, then `/` or `./`, then a
/// domain name. Anything else is treated as a URL.
pub fn detect_category(target: &str) -> TargetCategory {
    if IPV4_RE.is_match(target) {
        return TargetCategory::Ip;
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        return TargetCategory::Url;
    }
    if target.starts_with('/') || target.starts_with("./") {
        return TargetCategory::Path;
    }
    if DOMAIN_RE.is_match(target) {
        return TargetCategory::Domain;
    }
    TargetCategory::Url
}

/// Ordered `(command template, description)` pairs for a category.
pub fn recon_templates(category: TargetCategory) -> &'static [(&'static str, &'static str)] {
    match category {
        TargetCategory::Ip => &[
            ("nmap -sn {target}", "Host discovery"),
            ("nmap -sV -sC {target}", "Service version detection"),
            ("nmap -O {target}", "OS detection"),
        ],
        TargetCategory::Url => &[
            ("curl -I {target}", "HTTP headers"),
            ("whatweb {target}", "Web technology detection"),
            ("nikto -h {target}", "Web vulnerability scan"),
            (
                "gobuster dir -u {target} -w /usr/share/wordlists/dirb/common.txt",
                "Directory enumeration",
            ),
        ],
        TargetCategory::Domain => &[
            ("whois {target}", "WHOIS lookup"),
            ("dig {target} ANY", "DNS records"),
            ("nslookup {target}", "Name server lookup"),
            ("subfinder -d {target}", "Subdomain enumeration"),
            ("amass enum -d {target}", "Asset discovery"),
        ],
        TargetCategory::Path => &[
            ("ls -la {target}", "Directory listing"),
            ("find {target} -type f", "File discovery"),
            ("file {target}/*", "File type detection"),
        ],
    }
}

/// First whitespace-separated word of a command, ignoring a leading `RUN `.
pub fn tool_name(command: &str) -> &str {
    let command = command.strip_prefix("RUN ").unwrap_or(command);
    command.split_whitespace().next().unwrap_or("")
}

pub fn task_type_for_tool(tool: &str) -> TaskType {
    match tool {
        "whois" | "dig" | "nslookup" | "curl" | "whatweb" => TaskType::Recon,
        "nmap" | "masscan" | "rustscan" => TaskType::Scan,
        "gobuster" | "dirb" | "ffuf" | "subfinder" | "amass" => TaskType::Enumerate,
        "nikto" | "nuclei" | "wpscan" => TaskType::Analyze,
        _ => TaskType::Custom,
    }
}

/// Expected runtime in seconds; stealth triples it.
pub fn estimate_duration_secs(tool: &str, mode: ScanMode) -> u64 {
    let base = match tool {
        "nmap" => 120,
        "nikto" => 300,
        "gobuster" => 180,
        "whois" => 5,
        "dig" => 3,
        "curl" => 5,
        "whatweb" => 30,
        "subfinder" => 60,
        "amass" => 180,
        _ => 60,
    };
    match mode {
        ScanMode::Stealth => base * 3,
        ScanMode::Normal | ScanMode::Aggressive => base,
    }
}

/// Rate-limiting arguments inserted after the tool name in stealth mode.
pub fn stealth_modifier(tool: &str) -> Option<&'static str> {
    match tool {
        "nmap" => Some("-T2 --scan-delay 1s"),
        "gobuster" => Some("-t 1 --delay 1s"),
        "nikto" => Some("-Pause 2"),
        "curl" => Some("--max-time 30"),
        _ => None,
    }
}

/// Thread/depth arguments inserted after the tool name in aggressive mode.
pub fn aggressive_modifier(tool: &str) -> Option<&'static str> {
    match tool {
        "nmap" => Some("-T5 -A --script=vuln"),
        "gobuster" => Some("-t 50"),
        "nikto" => Some("-Tuning 9"),
        _ => None,
    }
}

/// The single modifier `mode` applies to `tool`, if any.
pub fn modifier_for(tool: &str, mode: ScanMode) -> Option<&'static str> {
    match mode {
        ScanMode::Normal => None,
        ScanMode::Stealth => stealth_modifier(tool),
        ScanMode::Aggressive => aggressive_modifier(tool),
    }
}

/// Insert `modifier` right after the tool name.
pub fn apply_modifier(command: &str, modifier: &str) -> String {
    let mut parts = command.split_whitespace();
    let tool = parts.next().unwrap_or("");
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        format!("{tool} {modifier}")
    } else {
        format!("{tool} {modifier} {}", rest.join(" "))
    }
}

/// Substitute the target and apply the mode modifier.
pub fn render_command(template: &str, target: &str, mode: ScanMode) -> String {
    let command = template.replace("{target}", target);
    match modifier_for(tool_name(&command), mode) {
        Some(modifier) => apply_modifier(&command, modifier),
        None => command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_category() {
        assert_eq!(detect_category("192.168.1.1"), TargetCategory::Ip);
        assert_eq!(detect_category("10.0.0.0/24"), TargetCategory::Ip);
        assert_eq!(detect_category("https://example.com"), TargetCategory::Url);
        assert_eq!(detect_category("/etc/passwd"), TargetCategory::Path);
        assert_eq!(detect_category("./loot"), TargetCategory::Path);
        assert_eq!(detect_category("example.com"), TargetCategory::Domain);
    }

    #[test]
    fn unknown_targets_default_to_url() {
        assert_eq!(detect_category("localhost"), TargetCategory::Url);
        assert_eq!(detect_category(""), TargetCategory::Url);
    }

    #[test]
    fn stealth_inserts_modifier_after_tool() {
        let cmd = render_command("nmap -sn {target}", "10.0.0.1", ScanMode::Stealth);
        assert_eq!(cmd, "nmap -T2 --scan-delay 1s -sn 10.0.0.1");
    }

    #[test]
    fn aggressive_inserts_its_own_modifier_only() {
        let cmd = render_command("nmap -O {target}", "10.0.0.1", ScanMode::Aggressive);
        assert_eq!(cmd, "nmap -T5 -A --script=vuln -O 10.0.0.1");
        assert!(!cmd.contains("--scan-delay"));
    }

    #[test]
    fn tools_without_modifiers_are_untouched() {
        let cmd = render_command("whois {target}", "example.com", ScanMode::Stealth);
        assert_eq!(cmd, "whois example.com");
    }

    #[test]
    fn stealth_triples_duration() {
        assert_eq!(estimate_duration_secs("nmap", ScanMode::Normal), 120);
        assert_eq!(estimate_duration_secs("nmap", ScanMode::Stealth), 360);
        assert_eq!(estimate_duration_secs("unknown", ScanMode::Aggressive), 60);
    }

    #[test]
    fn tool_name_strips_run_prefix() {
        assert_eq!(tool_name("RUN dig example.com ANY"), "dig");
        assert_eq!(tool_name("amass enum -d x"), "amass");
        assert_eq!(task_type_for_tool("amass"), TaskType::Enumerate);
        assert_eq!(task_type_for_tool("echo"), TaskType::Custom);
    }
}
