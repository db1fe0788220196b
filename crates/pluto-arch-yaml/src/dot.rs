//! Render an architecture as a Graphviz diagram.

use pluto_arch::{Architecture, RelationshipKind};
use std::fmt::Write;

/// Resources and closures become nodes labelled with their type; relationships
/// become edges, provisioning-time ones in black with an upper-cased label.
pub fn to_dot(arch: &Architecture) -> String {
    let mut out = String::from("strict digraph {\n");

    for res in arch.resources() {
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"<<{}>>\\n{}\"];",
            res.id,
            escape(&res.type_tag),
            escape(&res.name)
        );
    }
    for closure in arch.closures() {
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"<<Closure>>\\n{}\",shape=box];",
            closure.id,
            escape(&closure.id)
        );
    }

    for relat in arch.relationships() {
        let (mut label, color) = match relat.kind {
            RelationshipKind::Create => (relat.operation.to_uppercase(), "black"),
            RelationshipKind::MethodCall | RelationshipKind::PropertyAccess => {
                (relat.operation.clone(), "blue")
            }
        };
        if !relat.arguments.is_empty() {
            let params: Vec<String> = relat
                .arguments
                .iter()
                .map(|arg| format!("{}:{}", arg.name(), arg.stringify()))
                .collect();
            label.push(' ');
            label.push_str(&params.join(","));
        }

        for target in &relat.to {
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\",color=\"{}\"];",
                relat.from.id,
                target.id,
                escape(&label),
                color
            );
        }
    }

    out.push('}');
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_arch::{Argument, Closure, Relationship, Resource};

    #[test]
    fn test_edges() {
        let mut arch = Architecture::new();
        arch.add_closure(Closure::inline("handler")).unwrap();
        arch.add_resource(Resource::new("q", "queue", "@plutolang/pluto.Queue", vec![]))
            .unwrap();
        arch.add_relationship(Relationship::infrastructure(
            "q",
            "subscribe",
            vec![Argument::closure(0, "fn", "handler")],
        ))
        .unwrap();
        arch.add_relationship(Relationship::client("handler", "q", "push"))
            .unwrap();

        let dot = to_dot(&arch);
        assert!(dot.starts_with("strict digraph {\n"));
        assert!(dot.ends_with('}'));
        assert!(dot.contains("\"q\" [label=\"<<@plutolang/pluto.Queue>>\\nqueue\"];"));
        assert!(dot.contains("\"q\" -> \"handler\" [label=\"SUBSCRIBE fn:handler\",color=\"black\"];"));
        assert!(dot.contains("\"handler\" -> \"q\" [label=\"push\",color=\"blue\"];"));
    }

    #[test]
    fn test_quotes_escaped() {
        let mut arch = Architecture::new();
        arch.add_resource(Resource::new("r", "router", "@plutolang/pluto.Router", vec![]))
            .unwrap();
        arch.add_closure(Closure::inline("fn_3_1")).unwrap();
        arch.add_relationship(Relationship::infrastructure(
            "r",
            "get",
            vec![
                Argument::text(0, "path", "\"/hello\""),
                Argument::closure(1, "fn", "fn_3_1"),
            ],
        ))
        .unwrap();

        let dot = to_dot(&arch);
        assert!(dot.contains("label=\"GET path:\\\"/hello\\\",fn:fn_3_1\""));
    }
}
