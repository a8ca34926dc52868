//! RFC 2617 digest authentication
//!
//! Challenge parsing and response computation for cameras that guard their
//! snapshot URLs behind HTTP digest auth. Credentials travel in the URL's
//! userinfo and are stripped before the request goes out.

use md5::{Digest, Md5};
use rand::Rng;

/// Parsed WWW-Authenticate digest challenge
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value. Returns None unless the
    /// scheme is Digest and realm + nonce are present.
    pub fn parse(header: &str) -> Option<Self> {
        let rest = header.trim();
        if !rest.to_lowercase().starts_with("digest") {
            return None;
        }
        let rest = &rest["digest".len()..];

        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut opaque = None;
        let mut algorithm = None;

        for field in split_fields(rest) {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => algorithm = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            nonce: nonce?,
            qop,
            opaque,
            algorithm,
        })
    }

    /// True when the challenge requests qop=auth
    fn wants_auth_qop(&self) -> bool {
        self.qop
            .as_deref()
            .map(|q| q.split(',').any(|part| part.trim() == "auth"))
            .unwrap_or(false)
    }

    /// Build the Authorization header for one request
    pub fn authorization(
        &self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        nc: u32,
    ) -> String {
        let cnonce = random_cnonce();
        self.authorization_with_cnonce(method, uri, username, password, nc, &cnonce)
    }

    fn authorization_with_cnonce(
        &self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let nc_value = format!("{:08x}", nc);
        let response =
            compute_response(self, method, uri, username, password, &nc_value, cnonce);

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
            username, self.realm, self.nonce, uri, response
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if self.wants_auth_qop() {
            header.push_str(&format!(
                r#", qop=auth, nc={}, cnonce="{}""#,
                nc_value, cnonce
            ));
        }
        header
    }
}

/// Split the challenge parameter list on commas outside quotes
fn split_fields(s: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&s[start..]);
    fields
}

/// RFC 2617 response digest: MD5 over HA1/HA2 with or without qop=auth
fn compute_response(
    challenge: &DigestChallenge,
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    nc: &str,
    cnonce: &str,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));

    if challenge.wants_auth_qop() {
        md5_hex(&format!(
            "{}:{}:{}:{}:auth:{}",
            ha1, challenge.nonce, nc, cnonce, ha2
        ))
    } else {
        md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2))
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_challenge() -> DigestChallenge {
        DigestChallenge::parse(
            r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_challenge() {
        let c = rfc_challenge();
        assert_eq!(c.realm, "testrealm@host.com");
        assert_eq!(c.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(c.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(c.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
        assert!(c.wants_auth_qop());
    }

    #[test]
    fn test_parse_rejects_basic() {
        assert!(DigestChallenge::parse(r#"Basic realm="camera""#).is_none());
    }

    #[test]
    fn test_rfc2617_example_response() {
        // Example vector from RFC 2617 §3.5
        let c = rfc_challenge();
        let response = compute_response(
            &c,
            "GET",
            "/dir/index.html",
            "Mufasa",
            "Circle Of Life",
            "00000001",
            "0a4f113b",
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn test_authorization_header_fields() {
        let c = rfc_challenge();
        let header = c.authorization_with_cnonce(
            "GET",
            "/dir/index.html",
            "Mufasa",
            "Circle Of Life",
            1,
            "0a4f113b",
        );
        assert!(header.starts_with("Digest username=\"Mufasa\""));
        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }
}
