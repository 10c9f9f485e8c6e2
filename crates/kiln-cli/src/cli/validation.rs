/// Parse `--workers`: a positive integer.
pub fn parse_pool_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("at least one worker is required".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("not a number: '{s}'")),
    }
}
