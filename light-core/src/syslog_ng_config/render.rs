//! Text rendering of a configuration document
//!
//! ```text
//! @version: 4.0
//! @include "scl.conf"
//! options {
//!     stats(level(1));
//! };
//!
//! source src_file_3f9a01c2d4 {
//!     file (
//!         "/tmp/light/.../input.log"
//!         follow-freq(1)
//!     );
//! };
//!
//! log {
//!     source(src_file_3f9a01c2d4);
//!     destination(dst_file_88b1e0a7c3);
//! };
//! ```

use std::fmt::Write;

use super::document::{Template, TemplateForm};
use super::logpath::LogPath;
use super::option::{quote, OptionValue, Options};
use super::statement::{Statement, StatementGroup};

const INDENT: &str = "    ";

pub(crate) fn render_version(out: &mut String, version: &str) {
    let _ = writeln!(out, "@version: {version}");
}

pub(crate) fn render_includes(out: &mut String, includes: &[String]) {
    for include in includes {
        let _ = writeln!(out, "@include {}", quote(include));
    }
}

pub(crate) fn render_global_options(out: &mut String, options: &Options) {
    if options.is_empty() {
        return;
    }
    out.push_str("options {\n");
    for (name, value) in options {
        let _ = writeln!(out, "{INDENT}{name}({});", value.render_inline());
    }
    out.push_str("};\n");
}

pub(crate) fn render_templates(out: &mut String, templates: &[Template]) {
    for template in templates {
        match template.form {
            TemplateForm::Block => {
                let _ = writeln!(out, "template {} {{", template.name);
                let _ = writeln!(out, "{INDENT}template({});", quote(&template.body));
                if let Some(escape) = template.escape {
                    let _ = writeln!(out, "{INDENT}template-escape({});", OptionValue::Bool(escape).render_inline());
                }
                out.push_str("};\n");
            }
            TemplateForm::Simple => {
                let _ = writeln!(out, "template {} {};", template.name, quote(&template.body));
            }
            TemplateForm::Function => {
                let _ = writeln!(out, "template-function {} {};", template.name, quote(&template.body));
            }
        }
    }
}

fn render_option(out: &mut String, depth: usize, name: &str, value: &OptionValue) {
    let indent = INDENT.repeat(depth);
    match value {
        OptionValue::List(items) => {
            for item in items {
                let _ = writeln!(out, "{indent}{name}({})", item.render_inline());
            }
        }
        OptionValue::Nested(options) => {
            let _ = writeln!(out, "{indent}{name}(");
            for (inner_name, inner_value) in options {
                render_option(out, depth + 1, inner_name, inner_value);
            }
            let _ = writeln!(out, "{indent})");
        }
        OptionValue::Arrowed(pairs) => {
            let _ = writeln!(out, "{indent}{name}(");
            for (key, value) in pairs {
                let _ = writeln!(out, "{indent}{INDENT}{} => {}", quote(key), value.render_inline());
            }
            let _ = writeln!(out, "{indent})");
        }
        scalar => {
            let _ = writeln!(out, "{indent}{name}({})", scalar.render_inline());
        }
    }
}

pub(crate) fn render_statement(out: &mut String, statement: &Statement) {
    let _ = writeln!(out, "{INDENT}{} (", statement.driver_name());
    for value in statement.positional() {
        let _ = writeln!(out, "{INDENT}{INDENT}{}", value.render_inline());
    }
    for (name, value) in statement.options() {
        render_option(out, 2, name, value);
    }
    let _ = write!(out, "{INDENT})");
}

/// Caller guarantees every group has a statement
pub(crate) fn render_statement_group(out: &mut String, group: &StatementGroup, statement: &Statement) {
    let _ = writeln!(out, "\n{} {} {{", group.id.kind().keyword(), group.id.name());
    render_statement(out, statement);
    out.push_str(";\n};\n");
}

pub(crate) fn render_logpath(out: &mut String, path: &LogPath, depth: usize) {
    let indent = INDENT.repeat(depth);
    match path.name() {
        Some(name) => {
            let _ = writeln!(out, "{indent}log {name} {{");
        }
        None => {
            let _ = writeln!(out, "{indent}log {{");
        }
    }
    for id in path.ordered() {
        let _ = writeln!(out, "{indent}{INDENT}{}({});", id.kind().keyword(), id.name());
    }
    for inner in path.inner() {
        render_logpath(out, inner, depth + 1);
    }
    if !path.flags().is_empty() {
        let flags: Vec<String> = path.flags().iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "{indent}{INDENT}flags({});", flags.join(", "));
    }
    let _ = writeln!(out, "{indent}}};");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syslog_ng_config::logpath::LogPathFlag;
    use crate::syslog_ng_config::statement::{StatementId, StatementKind};

    #[test]
    fn test_statement_layout() {
        let statement = Statement::new("network")
            .with_option("ip", "127.0.0.1")
            .with_option("port", 5140)
            .with_option("tls", OptionValue::nested([("peer-verify", OptionValue::raw("none"))]))
            .with_option("tags", OptionValue::List(vec!["a".into(), "b".into()]));
        let mut out = String::new();
        render_statement(&mut out, &statement);
        let expected = "    network (\n\
                        \x20       ip(\"127.0.0.1\")\n\
                        \x20       port(5140)\n\
                        \x20       tls(\n\
                        \x20           peer-verify(none)\n\
                        \x20       )\n\
                        \x20       tags(\"a\")\n\
                        \x20       tags(\"b\")\n\
                        \x20   )";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_filter_expression_layout() {
        let mut out = String::new();
        render_statement(&mut out, &Statement::expression("message(\"foo\")"));
        assert_eq!(out, "     (\n        message(\"foo\")\n    )");
    }

    #[test]
    fn test_nested_logpath_with_flags() {
        let path = LogPath::named("main")
            .with(StatementId::new(StatementKind::Source, "s"))
            .with_inner(
                LogPath::new()
                    .with(StatementId::new(StatementKind::Destination, "d"))
                    .with_flag(LogPathFlag::Final),
            )
            .with_flag(LogPathFlag::FlowControl);
        let mut out = String::new();
        render_logpath(&mut out, &path, 0);
        assert_eq!(
            out,
            "log main {\n    source(s);\n    log {\n        destination(d);\n        flags(final);\n    };\n    flags(flow-control);\n};\n"
        );
    }

    #[test]
    fn test_template_forms() {
        let templates = vec![
            Template::block("t_block", "${MSG}\n").with_escape(true),
            Template::simple("t_simple", "$HOST"),
            Template::function("tf_upper", "$(uppercase $MSG)"),
        ];
        let mut out = String::new();
        render_templates(&mut out, &templates);
        assert_eq!(
            out,
            "template t_block {\n    template(\"${MSG}\\n\");\n    template-escape(yes);\n};\n\
             template t_simple \"$HOST\";\n\
             template-function tf_upper \"$(uppercase $MSG)\";\n"
        );
    }
}
