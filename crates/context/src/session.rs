/// Session protocol a request context was established under (§6 "Flags").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProtocol {
    H1,
    H1c,
    H2,
    H2c,
    Https,
    Http,
}

impl SessionProtocol {
    pub fn is_tls(self) -> bool {
        matches!(self, Self::H1 | Self::H2 | Self::Https)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H1 => "h1",
            Self::H1c => "h1c",
            Self::H2 => "h2",
            Self::H2c => "h2c",
            Self::Https => "https",
            Self::Http => "http",
        }
    }
}
