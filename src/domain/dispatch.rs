//! Kind-keyed serializer tables for lesson units and map entries.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::domain::entities::{
    BranchingKind, ContentKind, ContentNode, GraphNode, LessonUnit, UnitBody, UnitKind,
};

/// Renders one lesson unit for a client.
pub type UnitSerializer = fn(&LessonUnit) -> Value;

/// Renders one content node for a client.
pub type NodeSerializer = fn(&ContentNode) -> Value;

/// Table of unit serializers keyed by unit kind.
#[derive(Clone)]
pub struct SerializerTable {
    units: HashMap<UnitKind, UnitSerializer>,
}

impl Default for SerializerTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl SerializerTable {
    pub fn empty() -> Self {
        Self {
            units: HashMap::new(),
        }
    }

    /// Serializers for every built-in unit kind.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(UnitKind::Dialogue, serialize_text);
        table.register(UnitKind::Theory, serialize_theory);
        table.register(UnitKind::Image, serialize_image);
        table.register(UnitKind::Reply, serialize_text);
        table.register(UnitKind::Email, serialize_email);
        table.register(UnitKind::Button, serialize_button);
        table.register(UnitKind::Task, serialize_task);
        table
    }

    pub fn register(&mut self, kind: UnitKind, serializer: UnitSerializer) {
        self.units.insert(kind, serializer);
    }

    /// Kinds without a registered serializer fall back to identity fields.
    pub fn serialize(&self, unit: &LessonUnit) -> Value {
        match self.units.get(&unit.kind()) {
            Some(serializer) => serializer(unit),
            None => Value::Object(base(unit)),
        }
    }

    /// Synthetic unit bundling the alternatives a player chooses between.
    pub fn choice(&self, options: &[&LessonUnit]) -> Value {
        json!({
            "type": "choice",
            "options": options.iter().map(|u| self.serialize(u)).collect::<Vec<_>>(),
        })
    }
}

fn base(unit: &LessonUnit) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("id".into(), json!(unit.id));
    fields.insert("type".into(), json!(unit.kind().as_str()));
    if let Some(location) = &unit.location {
        fields.insert("location".into(), json!(location));
    }
    if let Some(npc) = &unit.npc {
        fields.insert("npc".into(), json!(npc));
    }
    fields
}

fn with(unit: &LessonUnit, extra: Value) -> Value {
    let mut fields = base(unit);
    if let Value::Object(extra) = extra {
        fields.extend(extra);
    }
    Value::Object(fields)
}

fn serialize_text(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Dialogue { text } | UnitBody::Reply { text } => with(unit, json!({ "text": text })),
        _ => Value::Object(base(unit)),
    }
}

fn serialize_theory(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Theory { title, text } => with(unit, json!({ "title": title, "text": text })),
        _ => Value::Object(base(unit)),
    }
}

fn serialize_image(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Image { url } => with(unit, json!({ "url": url })),
        _ => Value::Object(base(unit)),
    }
}

fn serialize_email(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Email { subject, body } => {
            with(unit, json!({ "subject": subject, "body": body }))
        }
        _ => Value::Object(base(unit)),
    }
}

fn serialize_button(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Button { label } => with(unit, json!({ "label": label })),
        _ => Value::Object(base(unit)),
    }
}

// answers stay server-side
fn serialize_task(unit: &LessonUnit) -> Value {
    match &unit.body {
        UnitBody::Task(task) => with(
            unit,
            json!({
                "task": task.kind,
                "question": task.question,
                "options": task.options,
            }),
        ),
        _ => Value::Object(base(unit)),
    }
}

/// Table of map-entry serializers keyed by content kind.
#[derive(Clone)]
pub struct SummaryTable {
    nodes: HashMap<ContentKind, NodeSerializer>,
}

impl Default for SummaryTable {
    fn default() -> Self {
        let mut nodes: HashMap<ContentKind, NodeSerializer> = HashMap::new();
        nodes.insert(ContentKind::Lesson, summarize_lesson);
        nodes.insert(ContentKind::Quest, summarize_quest);
        nodes.insert(ContentKind::Branching, summarize_branching);
        Self { nodes }
    }
}

impl SummaryTable {
    pub fn summarize(&self, node: &ContentNode) -> Value {
        match self.nodes.get(&node.kind()) {
            Some(serializer) => serializer(node),
            None => json!({ "id": node.id(), "kind": node.kind() }),
        }
    }
}

fn summarize_lesson(node: &ContentNode) -> Value {
    let Some(lesson) = node.as_lesson() else {
        return Value::Null;
    };
    json!({
        "id": lesson.id,
        "kind": ContentKind::Lesson,
        "title": lesson.title,
        "cost": lesson.cost,
    })
}

fn summarize_quest(node: &ContentNode) -> Value {
    let Some(quest) = node.as_quest() else {
        return Value::Null;
    };
    json!({
        "id": quest.id,
        "kind": ContentKind::Quest,
        "title": quest.title,
    })
}

fn summarize_branching(node: &ContentNode) -> Value {
    let Some(branching) = node.as_branching() else {
        return Value::Null;
    };
    let kind = branching.kind();
    let mut value = json!({
        "id": branching.id,
        "kind": ContentKind::Branching,
        "title": branching.title,
        "branching": kind.to_string(),
    });
    if kind != BranchingKind::ProfileParameter {
        value["candidates"] = json!(branching.candidates());
        value["prices"] = json!(branching.prices);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Task, TaskKind};

    fn unit(id: &str, body: UnitBody) -> LessonUnit {
        LessonUnit {
            id: id.into(),
            body,
            next: vec![],
            location: Some("lab".into()),
            npc: None,
        }
    }

    #[test]
    fn given_task_unit_when_serializing_then_answer_is_hidden() {
        let table = SerializerTable::standard();
        let task = unit(
            "t1",
            UnitBody::Task(Task {
                kind: TaskKind::SingleChoice,
                question: "2 + 2?".into(),
                options: vec!["3".into(), "4".into()],
                answer: Some("4".into()),
            }),
        );

        let value = table.serialize(&task);

        assert_eq!(value["type"], "task");
        assert_eq!(value["task"], "single_choice");
        assert_eq!(value["location"], "lab");
        assert!(value.get("answer").is_none());
    }

    #[test]
    fn given_empty_table_when_serializing_then_falls_back_to_identity() {
        let table = SerializerTable::empty();
        let value = table.serialize(&unit("d1", UnitBody::Dialogue { text: "hi".into() }));

        assert_eq!(value["id"], "d1");
        assert_eq!(value["type"], "dialogue");
        assert!(value.get("text").is_none());
    }

    #[test]
    fn given_reply_options_when_bundling_then_choice_lists_each() {
        let table = SerializerTable::standard();
        let yes = unit("r1", UnitBody::Reply { text: "yes".into() });
        let no = unit("r2", UnitBody::Reply { text: "no".into() });

        let value = table.choice(&[&yes, &no]);

        assert_eq!(value["type"], "choice");
        assert_eq!(value["options"][1]["text"], "no");
    }
}
