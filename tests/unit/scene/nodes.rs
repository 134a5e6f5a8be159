use super::*;

fn group_node(name: &str, tree: &str) -> Node {
    Node::new(
        name,
        NodeKind::Group {
            tree: Some(tree.to_string()),
        },
    )
}

#[test]
fn empty_tree_has_no_output() {
    assert!(!NodeTree::default().has_output(&HashMap::new()));
}

#[test]
fn muted_composite_does_not_count() {
    let mut composite = Node::new("out", NodeKind::Composite);
    composite.muted = true;
    let tree = NodeTree {
        name: "t".into(),
        nodes: vec![composite],
        links: vec![],
    };
    assert!(!tree.has_output(&HashMap::new()));
}

#[test]
fn output_found_through_nested_groups() {
    let mut groups = HashMap::new();
    groups.insert(
        "inner".to_string(),
        NodeTree {
            name: "inner".into(),
            nodes: vec![Node::new(
                "file",
                NodeKind::OutputFile {
                    path: "//out".into(),
                },
            )],
            links: vec![],
        },
    );
    groups.insert(
        "outer".to_string(),
        NodeTree {
            name: "outer".into(),
            nodes: vec![group_node("g", "inner")],
            links: vec![],
        },
    );
    let tree = NodeTree {
        name: "main".into(),
        nodes: vec![group_node("g", "outer")],
        links: vec![],
    };
    assert!(tree.has_output(&groups));
}

#[test]
fn self_referencing_groups_terminate() {
    let mut groups = HashMap::new();
    groups.insert(
        "loop".to_string(),
        NodeTree {
            name: "loop".into(),
            nodes: vec![group_node("again", "loop")],
            links: vec![],
        },
    );
    let tree = NodeTree {
        name: "main".into(),
        nodes: vec![group_node("g", "loop")],
        links: vec![],
    };
    assert!(!tree.has_output(&groups));
}

#[test]
fn input_of_follows_links_and_skips_muted() {
    let mut muted = Node::new("blur", NodeKind::Filter { op: "blur".into() });
    muted.muted = true;
    let tree = NodeTree {
        name: "t".into(),
        nodes: vec![
            Node::new(
                "rl",
                NodeKind::RenderLayers {
                    scene: None,
                    layer: None,
                },
            ),
            muted,
            Node::new("out", NodeKind::Composite),
        ],
        links: vec![NodeLink::new("blur", "out"), NodeLink::new("rl", "out")],
    };
    assert_eq!(tree.input_of("out").map(|n| n.name.as_str()), Some("rl"));
    assert_eq!(tree.render_layer_nodes().count(), 1);
}

#[test]
fn node_kinds_deserialize_from_tagged_json() {
    let node: Node = serde_json::from_str(
        r#"{ "name": "rl", "type": "render_layers", "scene": { "name": "Other" } }"#,
    )
    .unwrap();
    assert_eq!(
        node.kind,
        NodeKind::RenderLayers {
            scene: Some(SceneId::local("Other")),
            layer: None
        }
    );
    assert!(!node.muted);
}
