//! Hosts-file rendering for the run directory and the runtime containers.

/// Leading entry of every generated `hosts.txt`.
pub const MYSQL_HOSTS_ENTRY: &str = "127.0.0.1 mysql";

const LOOPBACK: &str = "127.0.0.1";

/// Render `hosts.txt`: the fixed mysql line, then one loopback line per host.
pub fn render_hosts_file(hosts: &[String]) -> String {
    let mut buf = String::new();
    buf.push_str(MYSQL_HOSTS_ENTRY);
    buf.push('\n');
    buf.push_str(&render_host_block(LOOPBACK, hosts));
    buf
}

/// Render `<ip> <host>` lines, one per host, each newline-terminated.
pub fn render_host_block(ip: &str, hosts: &[String]) -> String {
    let mut buf = String::new();
    for host in hosts {
        buf.push_str(ip);
        buf.push(' ');
        buf.push_str(host);
        buf.push('\n');
    }
    buf
}

/// Shell script that appends `block` to `/etc/hosts` and quietly refreshes the
/// container's CA trust store.
pub fn hosts_append_script(block: &str) -> String {
    format!(
        "echo \"{}\" >> /etc/hosts && update-ca-certificates > /dev/null 2>&1",
        block.replace('\\', "\\\\").replace('"', "\\\"")
    )
}
