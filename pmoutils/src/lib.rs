//! Petits utilitaires partagés par les crates PMOStream
//!
//! - [`guess_local_ip`] : devine l'adresse IP locale utilisée pour les connexions sortantes
//! - [`get_os_string`] : décrit le système d'exploitation courant
//! - [`user_agent`] : construit un User-Agent HTTP incluant le système
mod ip_utils;

pub use ip_utils::guess_local_ip;

/// Retourne une chaîne décrivant le système d'exploitation et sa version.
///
/// # Format
/// - macOS: "Macos/15.1"
/// - Linux: "Ubuntu/22.04"
/// - Autre: "{OS}/Unknown"
///
/// ```
/// let os = pmoutils::get_os_string();
/// assert!(os.contains('/'));
/// ```
pub fn get_os_string() -> String {
    let info = os_info::get();
    let os_type = format!("{:?}", info.os_type());

    let version = info.version();
    if version != &os_info::Version::Unknown {
        format!("{}/{}", os_type, version)
    } else {
        format!("{}/Unknown", os_type)
    }
}

/// Construit un User-Agent de la forme `produit/version (OS/version)`.
///
/// ```
/// let ua = pmoutils::user_agent("PMOStream", "0.1.0");
/// assert!(ua.starts_with("PMOStream/0.1.0 ("));
/// ```
pub fn user_agent(product: &str, version: &str) -> String {
    format!("{}/{} ({})", product, version, get_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_string_has_separator() {
        let os = get_os_string();
        assert!(os.contains('/'));
        assert!(!os.starts_with('/'));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = user_agent("PMOStream", "1.2.3");
        assert!(ua.starts_with("PMOStream/1.2.3 ("));
        assert!(ua.ends_with(')'));
    }
}
