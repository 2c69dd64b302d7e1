//! Script rendering
//!
//! Output has up to three sections: imports, definitions and cleanup. The
//! cleanup deletes import aliases and temporaries so that executing the
//! script leaves only the root names behind.

use crate::{archive::Persistent, config::Config};

pub fn render(persistent: &Persistent, config: &Config) -> String {
    let imports: Vec<String> = persistent
        .imports
        .iter()
        .map(ToString::to_string)
        .collect();

    let definitions: Vec<String> = persistent
        .definitions
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut cleanup: Vec<String> = persistent
        .imports
        .iter()
        .map(|decl| format!("del {}", decl.alias))
        .collect();
    let temporaries: Vec<&str> = persistent
        .definitions
        .iter()
        .map(|definition| definition.name.as_str())
        .filter(|name| name.starts_with('_') && !config.is_allowed(name))
        .collect();
    if !temporaries.is_empty() {
        cleanup.push(format!("del {}", temporaries.join(",")));
    }
    cleanup.push("try: del __builtins__".to_owned());
    cleanup.push("except NameError: pass".to_owned());

    let separator = format!("\n{}", config.section_separator);
    [imports, definitions, cleanup]
        .iter()
        .map(|lines| lines.join("\n"))
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join(&separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::Definition, imports::ImportDecl};

    fn definition(name: &str, template: &str) -> Definition {
        Definition {
            name: name.to_owned(),
            template: template.to_owned(),
        }
    }

    #[test]
    fn test_sections_and_cleanup() {
        let persistent = Persistent {
            imports: vec![ImportDecl {
                source: "math".to_owned(),
                name: Some("inf".to_owned()),
                alias: "inf".to_owned(),
            }],
            definitions: vec![
                definition("_t_0", "inf"),
                definition("_keep", "1"),
                definition("x", "[_t_0, _t_0, _keep]"),
            ],
        };
        let config = Config {
            allowed_names: vec!["_keep".to_owned()],
            ..Config::default()
        };
        insta::assert_snapshot!(render(&persistent, &config), @r"
        from math import inf
        _t_0 = inf
        _keep = 1
        x = [_t_0, _t_0, _keep]
        del inf
        del _t_0
        try: del __builtins__
        except NameError: pass
        ");
    }

    #[test]
    fn test_empty_sections_dropped_and_separator() {
        let persistent = Persistent {
            imports: Vec::new(),
            definitions: vec![definition("a", "1")],
        };
        let config = Config {
            section_separator: "#".to_owned(),
            ..Config::default()
        };
        assert_eq!(
            render(&persistent, &config),
            "a = 1\n#try: del __builtins__\nexcept NameError: pass"
        );
    }
}
