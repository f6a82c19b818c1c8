use url::Url;

/// Parses a service base URL so that `join` appends to its path instead of replacing the last segment.
pub fn parse_base_url(endpoint: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
