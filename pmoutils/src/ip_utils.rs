use std::net::UdpSocket;

/// Devine l'adresse IP locale de la machine.
///
/// Crée un socket UDP et le « connecte » vers un serveur DNS public pour
/// demander au système quelle interface serait utilisée. Aucun paquet n'est
/// envoyé. Retourne `127.0.0.1` si l'une des étapes échoue.
///
/// C'est l'adresse annoncée aux récepteurs pour qu'ils viennent tirer le flux
/// audio servi par le relais local.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}
