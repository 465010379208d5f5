/// Socks-proxy passthrough, surfaced on the CLI only when a `*_ENABLE_SOCKS`
/// environment variable is set (see spec §6). Carried end-to-end from CLI
/// flags down to the SSH client so an operator behind a jump host can reach
/// spawned clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceParams {
    pub socks_proxy_host: Option<String>,
    pub socks_proxy_port: Option<u16>,
}

impl ServiceParams {
    pub fn new(socks_proxy_host: Option<String>, socks_proxy_port: Option<u16>) -> Self {
        ServiceParams { socks_proxy_host, socks_proxy_port }
    }

    /// True when any `*_ENABLE_SOCKS` variable is set in the process
    /// environment — this is what gates whether `--socks-host`/`--socks-port`
    /// even appear as CLI flags.
    pub fn socks_enabled_by_env() -> bool {
        std::env::vars().any(|(k, _)| k.ends_with("_ENABLE_SOCKS"))
    }
}
