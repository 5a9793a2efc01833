//! Deterministic resource names derived from application identity.

use crate::config::NamingConfig;

/// Expand a name template: `%a` becomes the application name, `%n` the
/// namespace. Any other `%x` sequence expands to nothing.
pub fn render_template(template: &str, app_name: &str, namespace: &str) -> String {
    let mut out = String::with_capacity(template.len() + app_name.len() + namespace.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push_str(app_name),
            Some('n') => out.push_str(namespace),
            Some(_) => {}
            None => out.push('%'),
        }
    }
    out
}

/// The backend resource names that belong to one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub pool: String,
    pub route: String,
    /// Path the route matches: `/<app_name>`.
    pub route_path: String,
    pub monitor: Option<String>,
    pub monitor_path: Option<String>,
}

impl ResourceNames {
    pub fn derive(naming: &NamingConfig, app_name: &str, namespace: &str) -> Self {
        let render = |t: &str| render_template(t, app_name, namespace);
        Self {
            pool: render(&naming.pool_name),
            route: render(&naming.route_name),
            route_path: format!("/{app_name}"),
            monitor: naming
                .monitor_name
                .as_deref()
                .map(render)
                .filter(|m| !m.is_empty()),
            monitor_path: naming
                .monitor_path
                .as_deref()
                .map(render)
                .filter(|p| !p.is_empty()),
        }
    }
}
