use lokicli_types::{AppIdentity, QuerySpec};

/// Label selector for one app's stream
pub fn selector(app: &AppIdentity) -> String {
    format!(
        r#"{{app="{}",namespace="{}",instance="{}"}}"#,
        app.app, app.namespace, app.instance
    )
}

/// LogQL for a query spec.
///
/// The regex is passed through verbatim; the service validates it.
pub fn build_query(spec: &QuerySpec) -> String {
    let selector = selector(&spec.app);
    match &spec.regex {
        Some(regex) => {
            let operator = if spec.invert { "!~" } else { "|~" };
            format!("{} {} `{}`", selector, operator, regex)
        }
        None => selector,
    }
}
