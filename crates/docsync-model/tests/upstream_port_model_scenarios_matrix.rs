mod common;

use common::{setup_test_log, Network};
use docsync_model::{PathElement, SyncOperation};
use serde_json::json;

fn key(k: &str) -> PathElement {
    PathElement::from(k)
}

#[test]
fn upstream_port_array_insert_racing_confirmed_remove() {
    setup_test_log();
    let mut net = Network::new(&json!({"list": ["a", "b"]}), &["s1", "s2"]);

    net.model(0)
        .at(&[key("list")])
        .and_then(|h| h.as_array())
        .expect("list is an array")
        .insert(1, json!("x"))
        .expect("insert must apply");
    net.model(1)
        .at(&[key("list")])
        .and_then(|h| h.as_array())
        .expect("list is an array")
        .remove(0)
        .expect("remove must apply");

    // s2 reaches the sequencer first.
    net.send(1);
    net.send(0);

    let history_tail = net.sequencer.version();
    assert_eq!(history_tail, 2);
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view, json!({"list": ["x", "b"]}));
}

#[test]
fn upstream_port_array_confirmed_insert_index_is_shifted_by_remove() {
    let mut net = Network::new(&json!({"list": ["a", "b"]}), &["s1", "s2"]);
    net.model(1)
        .at(&[key("list")])
        .and_then(|h| h.as_array())
        .unwrap()
        .remove(0)
        .unwrap();
    net.send(1);
    net.model(0)
        .at(&[key("list")])
        .and_then(|h| h.as_array())
        .unwrap()
        .insert(1, json!("x"))
        .unwrap();
    let out = net.clients[0].flush();
    assert_eq!(out.len(), 1);
    let (_, confirmed) = net.sequencer.submit(&out[0]);
    let SyncOperation::Discrete(op) = confirmed else {
        panic!("discrete operation expected");
    };
    assert_eq!(
        op.to_json().unwrap(),
        json!({
            "id": op.id,
            "noOp": false,
            "type": "ArrayInsert",
            "index": 0,
            "value": {"id": "s1:0", "type": "string", "value": "x"}
        })
    );
}

#[test]
fn upstream_port_number_add_racing_confirmed_set_value() {
    setup_test_log();
    let mut net = Network::new(&json!({"n": 10}), &["s1", "s2"]);

    net.model(0)
        .at(&[key("n")])
        .and_then(|h| h.as_number())
        .unwrap()
        .add(5.0)
        .unwrap();
    net.model(1)
        .at(&[key("n")])
        .and_then(|h| h.as_number())
        .unwrap()
        .set_value(20.0)
        .unwrap();
    assert_eq!(net.clients[0].model().data(), json!({"n": 15}));

    net.send(1);
    net.send(0);
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view, json!({"n": 20}));
}

#[test]
fn upstream_port_string_remove_racing_confirmed_insert() {
    setup_test_log();
    let mut net = Network::new(&json!({"s": "hello"}), &["s1", "s2"]);

    net.model(0)
        .at(&[key("s")])
        .and_then(|h| h.as_string())
        .unwrap()
        .remove(0, 1)
        .unwrap();
    net.model(1)
        .at(&[key("s")])
        .and_then(|h| h.as_string())
        .unwrap()
        .insert(0, "X")
        .unwrap();

    net.send(1);
    net.send(0);
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view, json!({"s": "Xello"}));
}

#[test]
fn upstream_port_concurrent_object_writes_resolve_to_first_confirmed() {
    let mut net = Network::new(&json!({"title": "draft"}), &["s1", "s2", "s3"]);

    net.model(0).root().set("title", json!("one")).unwrap();
    net.model(1).root().set("title", json!("two")).unwrap();
    net.model(2).root().remove("title").unwrap();

    net.send(1);
    net.send(0);
    net.send(2);
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view, json!({"title": "two"}));
}

#[test]
fn upstream_port_edit_inside_concurrently_removed_subtree_is_dropped() {
    let mut net = Network::new(&json!({"doc": {"body": "text"}, "keep": 1}), &["s1", "s2"]);

    net.model(0)
        .at(&[key("doc"), key("body")])
        .and_then(|h| h.as_string())
        .unwrap()
        .insert(4, "!")
        .unwrap();
    net.model(1).root().remove("doc").unwrap();

    net.send(1);
    net.send(0);
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view, json!({"keep": 1}));
}

#[test]
fn upstream_port_interleaved_edits_across_kinds_converge() {
    setup_test_log();
    let doc = json!({"items": [1, 2, 3], "name": "abc", "count": 0, "flag": false});
    let mut net = Network::new(&doc, &["s1", "s2"]);

    for round in 0..4 {
        {
            let model = net.model(0);
            let mut items = model.at(&[key("items")]).unwrap().as_array().unwrap();
            items.push(json!(10 + round)).unwrap();
            model
                .at(&[key("count")])
                .unwrap()
                .as_number()
                .unwrap()
                .increment()
                .unwrap();
        }
        net.send(0);
        {
            let model = net.model(1);
            let mut items = model.at(&[key("items")]).unwrap().as_array().unwrap();
            if !items.is_empty() {
                items.reorder(0, items.len() - 1).unwrap();
            }
            model
                .at(&[key("name")])
                .unwrap()
                .as_string()
                .unwrap()
                .insert(0, "z")
                .unwrap();
            model
                .at(&[key("count")])
                .unwrap()
                .as_number()
                .unwrap()
                .add(2.0)
                .unwrap();
        }
        net.send(1);
        net.deliver(0);
        net.deliver(1);
    }
    net.settle();

    let view = net.assert_converged();
    assert_eq!(view["count"], json!(12));
    assert_eq!(view["name"], json!("zzzzabc"));
    assert_eq!(view["items"].as_array().map(Vec::len), Some(7));
    for client in &net.clients {
        assert_eq!(client.control().pending_len(), 0);
        assert_eq!(client.control().context_version(), net.sequencer.version());
    }
}
