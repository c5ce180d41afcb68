use url::Url;

/// A printable `host:port/database` for a connection string, without
/// credentials.
///
/// Accepts URLs (`mysql://`, `postgres://`) and libpq `key=value` strings.
pub fn describe_endpoint(connection: &str) -> String {
    if let Ok(url) = Url::parse(connection) {
        let host = url.host_str().unwrap_or("localhost");
        let db = url.path().trim_start_matches('/');
        return match url.port() {
            Some(port) => format!("{host}:{port}/{db}"),
            None => format!("{host}/{db}"),
        };
    }

    let mut host = "localhost";
    let mut port = None;
    let mut db = "";
    for pair in connection.split_whitespace() {
        match pair.split_once('=') {
            Some(("host", v)) => host = v,
            Some(("port", v)) => port = Some(v),
            Some(("dbname", v)) => db = v,
            _ => {}
        }
    }
    match port {
        Some(port) => format!("{host}:{port}/{db}"),
        None => format!("{host}/{db}"),
    }
}
