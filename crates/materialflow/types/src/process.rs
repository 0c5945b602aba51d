//! The process model handed over by the front-end

use crate::{Attribute, Expression, OrderStep, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Struct every location instance derives from
pub const LOCATION_STRUCT: &str = "Location";
/// Struct for externally signalled events
pub const EVENT_STRUCT: &str = "Event";
/// Struct for cron-driven timers
pub const TIME_STRUCT: &str = "Time";

/// Root task name used when the model does not name one
pub const DEFAULT_START_TASK: &str = "mainTask";

/// A named attribute schema
///
/// Every struct implicitly carries `id` and `time` attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    pub name: String,
    /// Attribute name to declared type name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Struct {
    pub fn new(name: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), "string".to_string());
        attributes.insert("time".to_string(), "number".to_string());
        Self {
            name: name.into(),
            attributes,
            parent: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), type_name.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// A named, mutable record of some struct
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub struct_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Instance {
    /// Create an instance with the implicit `id` and `time` attributes set
    pub fn new(name: impl Into<String>, struct_name: impl Into<String>) -> Self {
        let name = name.into();
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), Attribute::primitive(name.as_str()));
        attributes.insert("time".to_string(), Attribute::primitive(0.0));
        Self {
            name,
            struct_name: struct_name.into(),
            attributes,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// One declared rule parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleParameter {
    pub name: String,
    #[serde(default)]
    pub default: Option<Expression>,
}

impl RuleParameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: Expression) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// A named, parameterized conjunction of boolean expressions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    pub expressions: Vec<Expression>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            expressions: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: RuleParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_expression(mut self, expression: Expression) -> Self {
        self.expressions.push(expression);
        self
    }
}

fn default_start_task() -> String {
    DEFAULT_START_TASK.to_string()
}

/// The validated process model
///
/// Catalogs are ordered lists rather than maps so that duplicate names
/// survive until the graph builder can report them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub structs: Vec<Struct>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub transport_steps: Vec<OrderStep>,
    #[serde(default)]
    pub move_steps: Vec<OrderStep>,
    #[serde(default)]
    pub action_steps: Vec<OrderStep>,
    #[serde(default = "default_start_task")]
    pub start_task: String,
}

impl Process {
    pub fn new() -> Self {
        Self {
            structs: Vec::new(),
            instances: Vec::new(),
            rules: Vec::new(),
            tasks: Vec::new(),
            transport_steps: Vec::new(),
            move_steps: Vec::new(),
            action_steps: Vec::new(),
            start_task: default_start_task(),
        }
    }

    pub fn with_start_task(mut self, name: impl Into<String>) -> Self {
        self.start_task = name.into();
        self
    }

    pub fn with_struct(mut self, s: Struct) -> Self {
        self.structs.push(s);
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_transport_step(mut self, step: OrderStep) -> Self {
        self.transport_steps.push(step);
        self
    }

    pub fn with_move_step(mut self, step: OrderStep) -> Self {
        self.move_steps.push(step);
        self
    }

    pub fn with_action_step(mut self, step: OrderStep) -> Self {
        self.action_steps.push(step);
        self
    }

    /// Add the `Location`, `Event` and `Time` structs when the model lacks them
    pub fn add_primitive_structs(&mut self) {
        let primitives = [
            Struct::new(LOCATION_STRUCT).with_attribute("type", "string"),
            Struct::new(EVENT_STRUCT).with_attribute("value", "boolean"),
            Struct::new(TIME_STRUCT)
                .with_attribute("timing", "string")
                .with_attribute("value", "boolean"),
        ];
        for primitive in primitives {
            if self.find_struct(&primitive.name).is_none() {
                self.structs.push(primitive);
            }
        }
    }

    /// Fill in what a deserialized model leaves implicit
    ///
    /// Adds the primitive structs, the `id`/`time` attribute declarations on
    /// every struct, and the `id`/`time` values on every instance. Values the
    /// model already carries are kept.
    pub fn normalize(&mut self) {
        self.add_primitive_structs();
        for s in &mut self.structs {
            s.attributes
                .entry("id".to_string())
                .or_insert_with(|| "string".to_string());
            s.attributes
                .entry("time".to_string())
                .or_insert_with(|| "number".to_string());
        }
        for instance in &mut self.instances {
            let id = Attribute::primitive(instance.name.as_str());
            instance.attributes.entry("id".to_string()).or_insert(id);
            instance
                .attributes
                .entry("time".to_string())
                .or_insert_with(|| Attribute::primitive(0.0));
        }
    }

    pub fn find_struct(&self, name: &str) -> Option<&Struct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn find_task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn find_instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Whether `struct_name` is `family` or derives from it
    ///
    /// Parent chains are followed at most once per struct so that a cyclic
    /// declaration cannot loop forever.
    pub fn derives_from(&self, struct_name: &str, family: &str) -> bool {
        let mut current = Some(struct_name);
        let mut seen = Vec::new();
        while let Some(name) = current {
            if name == family {
                return true;
            }
            if seen.contains(&name) {
                return false;
            }
            seen.push(name);
            current = self.find_struct(name).and_then(|s| s.parent.as_deref());
        }
        false
    }

    /// Every instance whose struct is `family` or one of its descendants
    pub fn instances_of(&self, family: &str) -> Vec<&Instance> {
        self.instances
            .iter()
            .filter(|i| self.derives_from(&i.struct_name, family))
            .collect()
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_has_implicit_attributes() {
        let inst = Instance::new("agv1", "Vehicle");
        assert_eq!(inst.attribute("id"), Some(&Attribute::primitive("agv1")));
        assert_eq!(inst.attribute("time"), Some(&Attribute::primitive(0.0)));
    }

    #[test]
    fn test_primitive_structs_added_once() {
        let mut process = Process::new().with_struct(Struct::new("Time"));
        process.add_primitive_structs();
        process.add_primitive_structs();
        assert_eq!(process.structs.len(), 3);
        // The model's own Time declaration wins.
        assert!(!process
            .find_struct("Time")
            .unwrap()
            .attributes
            .contains_key("timing"));
    }

    #[test]
    fn test_instances_of_follows_inheritance() {
        let mut process = Process::new()
            .with_struct(Struct::new("Shift").with_parent(TIME_STRUCT))
            .with_struct(Struct::new("Vehicle"))
            .with_instance(Instance::new("morning", "Shift"))
            .with_instance(Instance::new("tick", TIME_STRUCT))
            .with_instance(Instance::new("agv", "Vehicle"));
        process.add_primitive_structs();

        let names: Vec<_> = process
            .instances_of(TIME_STRUCT)
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["morning", "tick"]);
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let process = Process::new()
            .with_struct(Struct::new("A").with_parent("B"))
            .with_struct(Struct::new("B").with_parent("A"));
        assert!(!process.derives_from("A", TIME_STRUCT));
        assert!(process.derives_from("A", "B"));
    }

    #[test]
    fn test_normalize_fills_implicit_attributes() {
        let mut process: Process = serde_json::from_str(
            r#"{
                "structs": [{"name": "Pallet", "attributes": {"weight": "number"}}],
                "instances": [{
                    "name": "pallet",
                    "struct_name": "Pallet",
                    "attributes": {
                        "weight": {"kind": "primitive", "value": 1},
                        "time": {"kind": "primitive", "value": 5}
                    }
                }]
            }"#,
        )
        .unwrap();
        process.normalize();
        process.normalize();

        let pallet = process.find_instance("pallet").unwrap();
        assert_eq!(pallet.attribute("id"), Some(&Attribute::primitive("pallet")));
        // Values from the model are not overwritten.
        assert_eq!(pallet.attribute("time"), Some(&Attribute::primitive(5.0)));
        assert_eq!(pallet.attribute("weight"), Some(&Attribute::primitive(1.0)));

        let pallet_struct = process.find_struct("Pallet").unwrap();
        assert!(pallet_struct.attributes.contains_key("id"));
        assert!(pallet_struct.attributes.contains_key("time"));
        assert_eq!(process.structs.len(), 4);
        assert!(process.find_struct(TIME_STRUCT).is_some());
    }

    #[test]
    fn test_default_start_task_from_json() {
        let process: Process = serde_json::from_str("{}").unwrap();
        assert_eq!(process.start_task, DEFAULT_START_TASK);
    }
}
