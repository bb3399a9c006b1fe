use std::collections::BTreeMap;
use std::fmt;

/// Separates controller blocks in the rendered report.
pub const DELIMITER: &str =
    "-------------------------------------------------------------------------";

/// Pin usage of every controller that has at least one user.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub controllers: Vec<ControllerReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerReport {
    pub name: String,
    /// Raw `compatible` value of the controller node.
    pub compatible: String,
    pub pins: BTreeMap<u32, PinUsage>,
}

/// Users of a single pin. Each list keeps first-seen order without duplicates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PinUsage {
    /// `(node, property)` pairs referencing the pin through a GPIO specifier.
    pub consumers: Vec<(String, String)>,
    /// Nodes routing an interrupt through the pin.
    pub interrupts: Vec<String>,
    /// `(consumer, group)` pairs selecting the pin through a pinctrl state.
    pub pinctrl: Vec<(String, String)>,
}

impl PinUsage {
    pub fn add_consumer(&mut self, node: &str, property: &str) {
        push_unique(&mut self.consumers, (node.to_string(), property.to_string()));
    }

    pub fn add_interrupt(&mut self, node: &str) {
        push_unique(&mut self.interrupts, node.to_string());
    }

    pub fn add_pinctrl(&mut self, consumer: &str, group: &str) {
        push_unique(&mut self.pinctrl, (consumer.to_string(), group.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty() && self.interrupts.is_empty() && self.pinctrl.is_empty()
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

impl fmt::Display for ControllerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{\n\t'compatible' = {};\n}}\n", self.name, self.compatible)?;

        for (pin, usage) in &self.pins {
            writeln!(f, "{pin}:")?;
            if !usage.consumers.is_empty() {
                writeln!(f, "node:")?;
                for (node, prop) in &usage.consumers {
                    writeln!(f, "\t{node} -> {prop}")?;
                }
            }
            if !usage.interrupts.is_empty() {
                writeln!(f, "interrupt:")?;
                for node in &usage.interrupts {
                    writeln!(f, "\t{node}")?;
                }
            }
            if !usage.pinctrl.is_empty() {
                writeln!(f, "pinctrl:")?;
                for (consumer, group) in &usage.pinctrl {
                    writeln!(f, "\t{consumer} -> {group}")?;
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, controller) in self.controllers.iter().enumerate() {
            if i > 0 {
                writeln!(f, "{DELIMITER}")?;
            }
            write!(f, "{controller}")?;
        }
        Ok(())
    }
}
