pub(crate) fn default_host() -> String {
    "127.0.0.1".to_string()
}
