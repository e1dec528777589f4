//! Minimal User-Agent parsing: enough attribute extraction to feed the
//! device fingerprint. Treated as a pure lookup; full UA databases are
//! out of scope.

use crate::models::ClientInfo;

pub fn parse_user_agent(ua: &str) -> ClientInfo {
    ClientInfo {
        browser: browser_name(ua).to_string(),
        browser_version: version_after(ua, browser_token(ua)),
        os: os_name(ua).to_string(),
        os_version: os_version(ua),
        device_type: device_type(ua).to_string(),
    }
}

fn browser_name(ua: &str) -> &'static str {
    // Order matters: Edge and Opera embed "Chrome", Chrome embeds "Safari".
    if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        "Unknown"
    }
}

fn browser_token(ua: &str) -> &'static str {
    match browser_name(ua) {
        "Edge" => "Edg/",
        "Opera" => "OPR/",
        "Firefox" => "Firefox/",
        "Chrome" => "Chrome/",
        "Safari" => "Version/",
        _ => "",
    }
}

fn version_after(ua: &str, token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    ua.split(token)
        .nth(1)
        .and_then(|rest| rest.split([' ', ';', ')']).next())
        .unwrap_or("")
        .to_string()
}

fn os_name(ua: &str) -> &'static str {
    if ua.contains("Windows NT") {
        "Windows"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS X") {
        "macOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

fn os_version(ua: &str) -> String {
    let token = match os_name(ua) {
        "Windows" => "Windows NT ",
        "iOS" => "OS ",
        "macOS" => "Mac OS X ",
        "Android" => "Android ",
        _ => return String::new(),
    };
    ua.split(token)
        .nth(1)
        .and_then(|rest| rest.split([';', ')', ' ']).next())
        .unwrap_or("")
        .replace('_', ".")
}

fn device_type(ua: &str) -> &'static str {
    if ua.contains("iPad") || ua.contains("Tablet") {
        "tablet"
    } else if ua.contains("Mobi") || ua.contains("iPhone") || ua.contains("Android") {
        "mobile"
    } else {
        "desktop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    #[test]
    fn parses_desktop_chrome() {
        let info = parse_user_agent(CHROME_WIN);
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.browser_version, "120.0.0.0");
        assert_eq!(info.os, "Windows");
        assert_eq!(info.os_version, "10.0");
        assert_eq!(info.device_type, "desktop");
    }

    #[test]
    fn parses_firefox_on_linux() {
        let info = parse_user_agent(FIREFOX_LINUX);
        assert_eq!(info.browser, "Firefox");
        assert_eq!(info.os, "Linux");
        assert_eq!(info.device_type, "desktop");
    }

    #[test]
    fn parses_mobile_safari() {
        let info = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.os, "iOS");
        assert_eq!(info.os_version, "17.1");
        assert_eq!(info.device_type, "mobile");
    }

    #[test]
    fn unknown_ua_falls_back() {
        let info = parse_user_agent("curl/8.0.1");
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.device_type, "desktop");
    }
}
