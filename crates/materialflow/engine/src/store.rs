//! Instance store and rule book
//!
//! The store is the only mutable view of process data. Attribute writes go
//! through [`InstanceStore::set`], which refuses attributes the instance
//! does not declare.

use materialflow_types::{Attribute, Instance, Process, Rule, Value};
use std::collections::{BTreeMap, HashMap};

/// Named instances and their current attribute values
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceStore {
    instances: BTreeMap<String, Instance>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process(process: &Process) -> Self {
        let mut store = Self::new();
        for instance in &process.instances {
            store.insert(instance.clone());
        }
        store
    }

    pub fn insert(&mut self, instance: Instance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn attribute(&self, instance: &str, attribute: &str) -> Option<&Attribute> {
        self.get(instance).and_then(|i| i.attribute(attribute))
    }

    /// Overwrite a declared attribute
    ///
    /// Returns `false` when the instance or the attribute is unknown.
    pub fn set(&mut self, instance: &str, attribute: &str, value: Attribute) -> bool {
        match self
            .instances
            .get_mut(instance)
            .and_then(|i| i.attributes.get_mut(attribute))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Record the elapsed run time on an instance
    pub fn stamp_time(&mut self, instance: &str, seconds: f64) {
        self.set(instance, "time", Attribute::Primitive(Value::Number(seconds)));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Rules by name
#[derive(Clone, Debug, Default)]
pub struct RuleBook {
    rules: HashMap<String, Rule>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process(process: &Process) -> Self {
        let mut book = Self::new();
        for rule in &process.rules {
            book.insert(rule.clone());
        }
        book
    }

    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
