//! Per-controller cross-reference of GPIO consumers, interrupt routing and pinctrl groups.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{AnalysisError, TreeError};
use crate::platform::Platform;
use crate::report::{ControllerReport, PinUsage, Report};
use crate::resolve::{cells, specifier_triples, Resolver, COMPATIBLE};
use crate::tree::{NodeId, Tree};

/// Answers usage queries against a parsed tree.
///
/// Only live nodes take part: a node that is disabled, or sits below a disabled
/// node, is ignored everywhere.
pub struct Analyzer<'t> {
    tree: &'t Tree,
    resolver: Resolver<'t>,
    platform: Option<Platform>,
}

impl<'t> Analyzer<'t> {
    /// Create an analyzer, detecting the platform from the root `compatible`.
    pub fn new(tree: &'t Tree) -> Self {
        let platform = Platform::detect(tree);
        match platform {
            Some(platform) => debug!("detected {platform} platform"),
            None => debug!("no platform detected"),
        }

        Self::with_platform(tree, platform)
    }

    /// Create an analyzer decoding pinctrl groups for `platform`.
    pub fn with_platform(tree: &'t Tree, platform: Option<Platform>) -> Self {
        Self {
            tree,
            resolver: Resolver::new(tree),
            platform,
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn resolver(&self) -> &Resolver<'t> {
        &self.resolver
    }

    /// Live `gpio-controller` nodes that have a phandle, with that phandle.
    pub fn gpio_controllers(&self) -> Vec<(NodeId, u32)> {
        self.controllers_marked("gpio-controller")
    }

    /// Live `interrupt-controller` nodes that have a phandle, with that phandle.
    pub fn interrupt_controllers(&self) -> Vec<(NodeId, u32)> {
        self.controllers_marked("interrupt-controller")
    }

    /// Phandles referenced by `pinctrl-<N>` properties, in order of first use, with
    /// the distinct nodes referencing each of them.
    pub fn used_pinctrl_phandles(&self) -> Vec<(u32, Vec<NodeId>)> {
        let mut used: Vec<(u32, Vec<NodeId>)> = Vec::new();

        for id in self.live_nodes() {
            for (key, value) in self.tree.node(id).effective_props() {
                if !is_pinctrl_state(key) {
                    continue;
                }
                for phandle in cells(value).unwrap_or_default() {
                    match used.iter_mut().find(|(p, _)| *p == phandle) {
                        Some((_, users)) if users.contains(&id) => {}
                        Some((_, users)) => users.push(id),
                        None => used.push((phandle, vec![id])),
                    }
                }
            }
        }

        used
    }

    /// Controllers owning the pinctrl groups in use: the nearest node with a
    /// `compatible` property above (or at) each referenced group.
    pub fn pinctrl_controllers(&self) -> Vec<NodeId> {
        let mut controllers = Vec::new();

        for (phandle, _) in self.used_pinctrl_phandles() {
            let owner = self
                .pinctrl_group(phandle)
                .and_then(|group| self.resolver.nearest_identified_ancestor(group));
            if let Some(owner) = owner {
                if !controllers.contains(&owner) {
                    controllers.push(owner);
                }
            }
        }

        controllers
    }

    /// Pins of `controller` referenced through `<phandle pin flags>` specifiers, with
    /// the referencing node and property.
    pub fn gpio_usage(&self, controller: NodeId) -> BTreeMap<u32, Vec<(NodeId, &'t str)>> {
        let mut usage: BTreeMap<u32, Vec<_>> = BTreeMap::new();
        let Some(phandle) = self.resolver.phandle_of(controller) else {
            return usage;
        };

        for id in self.live_nodes() {
            for (key, value) in self.tree.node(id).effective_props() {
                for [_, pin, _] in specifier_triples(value, phandle).unwrap_or_default() {
                    usage.entry(pin).or_default().push((id, key));
                }
            }
        }

        usage
    }

    /// Pins of `controller` used as interrupt lines by nodes whose `interrupt-parent`
    /// is the controller. `interrupts` is read as `<pin type>` pairs.
    pub fn interrupt_usage(&self, controller: NodeId) -> BTreeMap<u32, Vec<NodeId>> {
        let mut usage: BTreeMap<u32, Vec<_>> = BTreeMap::new();
        let Some(phandle) = self.resolver.phandle_of(controller) else {
            return usage;
        };

        for id in self.live_nodes() {
            let node = self.tree.node(id);
            if node.prop("interrupt-parent").and_then(cells) != Some(vec![phandle]) {
                continue;
            }
            let Some(interrupts) = node.prop("interrupts").and_then(cells) else {
                continue;
            };
            for pin in interrupts.into_iter().step_by(2) {
                usage.entry(pin).or_default().push(id);
            }
        }

        usage
    }

    /// Pins of `controller` selected by pinctrl states, as `(consumer, group)` pairs.
    ///
    /// The group is the node declaring the pin, which is the referenced node or one
    /// of its descendants.
    pub fn pinctrl_usage(
        &self,
        controller: NodeId,
    ) -> Result<BTreeMap<u32, Vec<(NodeId, NodeId)>>, AnalysisError> {
        let platform = self.platform.ok_or(AnalysisError::PlatformUnknown)?;
        let mut usage: BTreeMap<u32, Vec<_>> = BTreeMap::new();

        for (phandle, consumers) in self.used_pinctrl_phandles() {
            let Some(group) = self.pinctrl_group(phandle) else {
                continue;
            };
            if self.resolver.nearest_identified_ancestor(group) != Some(controller) {
                continue;
            }

            let pins: Vec<(u32, NodeId)> = self
                .tree
                .enabled_descendants(group)
                .flat_map(|id| {
                    self.tree
                        .node(id)
                        .effective_props()
                        .into_iter()
                        .flat_map(move |(key, value)| platform.decode_pins(key, value))
                        .map(move |pin| (pin, id))
                })
                .collect();

            for &consumer in &consumers {
                for &(pin, declared_by) in &pins {
                    usage.entry(pin).or_default().push((consumer, declared_by));
                }
            }
        }

        Ok(usage)
    }

    /// Full report: GPIO consumers, interrupt routing and pinctrl groups.
    ///
    /// Fails with [`AnalysisError::PlatformUnknown`] when pinctrl groups are in use
    /// but no platform is known to decode them.
    pub fn report(&self) -> Result<Report, AnalysisError> {
        self.build_report(true)
    }

    /// Report without pinctrl decoding; works on any platform.
    pub fn gpio_report(&self) -> Result<Report, AnalysisError> {
        self.build_report(false)
    }

    fn build_report(&self, with_pinctrl: bool) -> Result<Report, AnalysisError> {
        let gpio_controllers = self.gpio_controllers();
        let interrupt_controllers = self.interrupt_controllers();
        let pinctrl_controllers = if with_pinctrl {
            self.pinctrl_controllers()
        } else {
            Vec::new()
        };
        if !pinctrl_controllers.is_empty() && self.platform.is_none() {
            return Err(AnalysisError::PlatformUnknown);
        }

        let mut report = Report::default();

        for id in self.tree.descendants(self.tree.root()) {
            let is_gpio = gpio_controllers.iter().any(|&(c, _)| c == id);
            let is_interrupt = interrupt_controllers.iter().any(|&(c, _)| c == id);
            let is_pinctrl = pinctrl_controllers.contains(&id);
            if !(is_gpio || is_interrupt || is_pinctrl) {
                continue;
            }

            let node = self.tree.node(id);
            let Some(compatible) = node.prop(COMPATIBLE) else {
                debug!("skipping controller {} without compatible", node.name()?);
                continue;
            };

            let mut pins: BTreeMap<u32, PinUsage> = BTreeMap::new();
            if is_gpio {
                for (pin, users) in self.gpio_usage(id) {
                    for (user, prop) in users {
                        pins.entry(pin).or_default().add_consumer(self.name(user)?, prop);
                    }
                }
                for (pin, users) in self.interrupt_usage(id) {
                    for user in users {
                        pins.entry(pin).or_default().add_interrupt(self.name(user)?);
                    }
                }
            }
            if is_pinctrl {
                for (pin, pairs) in self.pinctrl_usage(id)? {
                    for (consumer, group) in pairs {
                        pins.entry(pin)
                            .or_default()
                            .add_pinctrl(self.name(consumer)?, self.name(group)?);
                    }
                }
            }

            if pins.is_empty() {
                continue;
            }
            report.controllers.push(ControllerReport {
                name: node.name()?.to_string(),
                compatible: compatible.to_string(),
                pins,
            });
        }

        Ok(report)
    }

    fn controllers_marked(&self, marker: &str) -> Vec<(NodeId, u32)> {
        self.live_nodes()
            .filter(|&id| self.tree.node(id).prop(marker).is_some())
            .filter_map(|id| Some((id, self.resolver.phandle_of(id)?)))
            .collect()
    }

    /// The group referenced by `phandle`, unless it is missing or not live.
    fn pinctrl_group(&self, phandle: u32) -> Option<NodeId> {
        self.resolver
            .resolve_phandle(phandle)
            .filter(|&group| self.tree.is_live(group))
    }

    fn live_nodes(&self) -> impl Iterator<Item = NodeId> + 't {
        self.tree.enabled_descendants(self.tree.root())
    }

    fn name(&self, id: NodeId) -> Result<&'t str, TreeError> {
        self.tree.node(id).name()
    }
}

/// `pinctrl-0`, `pinctrl-1`, … but not `pinctrl-names`.
fn is_pinctrl_state(key: &str) -> bool {
    key.strip_prefix("pinctrl-")
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    use crate::parser::{from_str, parse, ParseOptions};

    const MSM: &str = r#"/dts-v1/;

/ {
	model = "Qualcomm Technologies, Inc. MSM8940 MTP";
	compatible = "qcom,msm8940-mtp", "qcom,msm8940", "qcom,mtp";
	interrupt-parent = <0x1>;

	soc {
		interrupt-controller@b000000 {
			compatible = "qcom,msm-qgic2";
			interrupt-controller;
			#interrupt-cells = <0x3>;
			phandle = <0x1>;
		};

		pinctrl@1000000 {
			compatible = "qcom,msm8937-pinctrl";
			gpio-controller;
			#gpio-cells = <0x2>;
			interrupt-controller;
			#interrupt-cells = <0x2>;
			phandle = <0x5a>;

			uart_console_active {
				phandle = <0x60>;

				mux {
					pins = "gpio4", "gpio5";
					function = "blsp_uart2";
				};

				config {
					pins = "gpio4", "gpio5";
					drive-strength = <0x2>;
					bias-disable;
				};
			};

			uart_console_sleep {
				phandle = <0x61>;

				config {
					pins = "gpio4", "gpio5";
					bias-pull-down;
				};
			};

			sdc2_cd_on {
				phandle = <0x62>;
				pins = "gpio67";
				bias-pull-up;
			};

			spi_active {
				phandle = <0x63>;
				status = "disabled";

				config {
					pins = "gpio16";
				};
			};
		};

		serial@78b0000 {
			compatible = "qcom,msm-uartdm-v1.4";
			pinctrl-names = "default", "sleep";
			pinctrl-0 = <0x60>;
			pinctrl-1 = <0x61>;
		};

		sdhci@7864900 {
			compatible = "qcom,sdhci-msm";
			interrupt-parent = <0x5a>;
			interrupts = <0x43 0x0>;
			cd-gpios = <0x5a 0x43 0x1>;
			pinctrl-0 = <0x62>;
		};

		spi@78b7000 {
			compatible = "qcom,spi-qup-v2";
			pinctrl-0 = <0x63>;
		};

		i2c@78b6000 {
			compatible = "qcom,i2c-msm-v2";
			status = "disabled";
			pinctrl-0 = <0x62>;

			touch@38 {
				interrupt-parent = <0x5a>;
				interrupts = <0x41 0x2>;
				reset-gpios = <0x5a 0x40 0x0>;
			};
		};
	};

	gpio_keys {
		compatible = "gpio-keys";

		vol_up {
			gpios = <0x5a 0x5b 0x1>;
			label = "volume_up";
		};

		camera {
			gpios = <0x5a 0x5c 0x1 0x5a 0x5d 0x1>;
		};
	};

	unresolved {
		pinctrl-0 = <0x99>;
	};
};
"#;

    const EXPECTED_MSM: &str = "pinctrl@1000000 {
\t'compatible' = \"qcom,msm8937-pinctrl\";
}
4:
pinctrl:
\tserial@78b0000 -> mux
\tserial@78b0000 -> config
5:
pinctrl:
\tserial@78b0000 -> mux
\tserial@78b0000 -> config
67:
node:
\tsdhci@7864900 -> cd-gpios
interrupt:
\tsdhci@7864900
pinctrl:
\tsdhci@7864900 -> sdc2_cd_on
91:
node:
\tvol_up -> gpios
92:
node:
\tcamera -> gpios
93:
node:
\tcamera -> gpios
";

    fn names<'t>(tree: &'t Tree, ids: impl IntoIterator<Item = NodeId>) -> Vec<&'t str> {
        ids.into_iter()
            .map(|id| tree.node(id).name().unwrap())
            .collect()
    }

    fn find(tree: &Tree, name: &str) -> NodeId {
        tree.descendants(tree.root())
            .find(|&id| tree.node(id).name() == Ok(name))
            .unwrap()
    }

    #[test]
    fn minimal_pinctrl_scenario() {
        let tree = from_str(
            r#"/ { compatible = "qcom,demo"; pinctrl@1000 { phandle = <0x5>; grp { pins = "gpio24"; }; }; dev { pinctrl-0 = <0x5>; }; };"#,
        )
        .unwrap();
        let analyzer = Analyzer::new(&tree);

        assert_eq!(analyzer.platform(), Some(Platform::Qualcomm));
        assert_eq!(analyzer.pinctrl_controllers(), vec![tree.root()]);

        let usage = analyzer.pinctrl_usage(tree.root()).unwrap();
        let grp = find(&tree, "grp");
        let dev = find(&tree, "dev");
        assert_eq!(usage.keys().copied().collect::<Vec<_>>(), vec![24]);
        assert_eq!(usage[&24], vec![(dev, grp)]);

        let report = analyzer.report().unwrap();
        assert_eq!(report.controllers.len(), 1);
        assert_eq!(
            report.controllers[0].pins[&24].pinctrl,
            vec![("dev".to_string(), "grp".to_string())]
        );
        assert_eq!(
            report.to_string(),
            "/ {\n\t'compatible' = \"qcom,demo\";\n}\n24:\npinctrl:\n\tdev -> grp\n"
        );
    }

    #[test]
    fn repeated_states_count_once() {
        let tree = from_str(
            r#"/ { compatible = "qcom,demo"; pinctrl@1000 { grp { phandle = <0x5>; pins = "gpio24"; }; }; dev { pinctrl-0 = <0x5>; pinctrl-1 = <0x5>; }; };"#,
        )
        .unwrap();
        let analyzer = Analyzer::new(&tree);
        let dev = find(&tree, "dev");
        let grp = find(&tree, "grp");

        assert_eq!(analyzer.used_pinctrl_phandles(), vec![(0x5, vec![dev])]);
        assert_eq!(analyzer.pinctrl_usage(tree.root()).unwrap()[&24], vec![(dev, grp)]);
    }

    #[test]
    fn group_referenced_directly() {
        let tree = from_str(
            r#"/ { compatible = "qcom,demo"; pinctrl@1000 { grp { phandle = <0x5>; pins = "gpio24"; }; }; dev { pinctrl-0 = <0x5>; }; };"#,
        )
        .unwrap();
        let report = Analyzer::new(&tree).report().unwrap();

        assert_eq!(
            report.controllers[0].pins[&24].pinctrl,
            vec![("dev".to_string(), "grp".to_string())]
        );
    }

    #[test]
    fn controllers() {
        let tree = from_str(MSM).unwrap();
        let analyzer = Analyzer::new(&tree);

        let gpio: Vec<_> = analyzer.gpio_controllers();
        assert_eq!(names(&tree, gpio.iter().map(|&(id, _)| id)), vec!["pinctrl@1000000"]);
        assert_eq!(gpio[0].1, 0x5a);

        assert_eq!(
            names(&tree, analyzer.interrupt_controllers().into_iter().map(|(id, _)| id)),
            vec!["interrupt-controller@b000000", "pinctrl@1000000"]
        );

        let used: Vec<_> = analyzer
            .used_pinctrl_phandles()
            .into_iter()
            .map(|(phandle, users)| (phandle, names(&tree, users)))
            .collect();
        assert_eq!(
            used,
            vec![
                (0x60, vec!["serial@78b0000"]),
                (0x61, vec!["serial@78b0000"]),
                (0x62, vec!["sdhci@7864900"]),
                (0x63, vec!["spi@78b7000"]),
                (0x99, vec!["unresolved"]),
            ]
        );

        assert_eq!(
            names(&tree, analyzer.pinctrl_controllers()),
            vec!["pinctrl@1000000"]
        );
    }

    #[test]
    fn gpio_and_interrupt_usage() {
        let tree = from_str(MSM).unwrap();
        let analyzer = Analyzer::new(&tree);
        let tlmm = find(&tree, "pinctrl@1000000");

        let gpio = analyzer.gpio_usage(tlmm);
        assert_eq!(gpio.keys().copied().collect::<Vec<_>>(), vec![0x43, 0x5b, 0x5c, 0x5d]);
        assert_eq!(gpio[&0x43], vec![(find(&tree, "sdhci@7864900"), "cd-gpios")]);

        let interrupts = analyzer.interrupt_usage(tlmm);
        assert_eq!(interrupts.keys().copied().collect::<Vec<_>>(), vec![0x43]);

        let gic = find(&tree, "interrupt-controller@b000000");
        assert!(analyzer.gpio_usage(gic).is_empty());
    }

    #[test]
    fn full_report() {
        let tree = from_str(MSM).unwrap();
        let report = Analyzer::new(&tree).report().unwrap();

        assert_eq!(report.to_string(), EXPECTED_MSM);
    }

    #[test]
    fn disabled_nodes_never_contribute() {
        let kept = parse(
            MSM,
            ParseOptions {
                keep_disabled: true,
            },
        )
        .unwrap();
        let filtered = from_str(MSM).unwrap();

        let kept_report = Analyzer::new(&kept).report().unwrap();
        let filtered_report = Analyzer::new(&filtered).report().unwrap();
        assert_eq!(kept_report, filtered_report);

        for pin in [16, 0x40, 0x41] {
            assert!(!kept_report.controllers[0].pins.contains_key(&pin));
        }
    }

    #[test]
    fn unknown_platform() {
        let source = MSM.replace(
            "\"qcom,msm8940-mtp\", \"qcom,msm8940\", \"qcom,mtp\"",
            "\"acme,board\"",
        );
        let tree = from_str(&source).unwrap();
        let analyzer = Analyzer::new(&tree);
        let tlmm = find(&tree, "pinctrl@1000000");

        assert_eq!(analyzer.platform(), None);
        assert_matches!(analyzer.report(), Err(AnalysisError::PlatformUnknown));
        assert_matches!(analyzer.pinctrl_usage(tlmm), Err(AnalysisError::PlatformUnknown));

        let report = analyzer.gpio_report().unwrap();
        let pins = &report.controllers[0].pins;
        assert_eq!(pins.keys().copied().collect::<Vec<_>>(), vec![0x43, 0x5b, 0x5c, 0x5d]);
        assert!(pins.values().all(|usage| usage.pinctrl.is_empty()));

        let forced = Analyzer::with_platform(&tree, Some(Platform::Qualcomm));
        assert_eq!(forced.report().unwrap().to_string(), EXPECTED_MSM);
    }

    #[test]
    fn mediatek_groups() {
        let tree = from_str(
            r#"/ {
	compatible = "mediatek,mt6765";

	pinctrl@10005000 {
		compatible = "mediatek,mt6765-pinctrl";
		gpio-controller;
		phandle = <0x8>;

		i2c0_pins {
			phandle = <0x9>;

			pins_cmd_dat {
				pinmux = <0x10802 0x10902>;
			};
		};

		keys_pins {
			phandle = <0xa>;

			pins_cmd_dat {
				pins = <0x1234>;
			};
		};
	};

	i2c@11007000 {
		pinctrl-0 = <0x9>;
	};

	keys {
		pinctrl-0 = <0xa>;
		key-gpios = <0x8 0x5 0x0>;
	};
};
"#,
        )
        .unwrap();
        let report = Analyzer::new(&tree).report().unwrap();
        let pins = &report.controllers[0].pins;

        assert_eq!(pins.keys().copied().collect::<Vec<_>>(), vec![5, 8, 9, 0x12]);
        assert_eq!(
            pins[&8].pinctrl,
            vec![("i2c@11007000".to_string(), "pins_cmd_dat".to_string())]
        );
        assert_eq!(pins[&5].consumers, vec![("keys".to_string(), "key-gpios".to_string())]);
    }

    #[test]
    fn spreadtrum_groups() {
        let tree = from_str(
            r#"/ {
	compatible = "sprd,sc9863a";

	pinctrl@402a0000 {
		compatible = "sprd,sc9863a-pinctrl";
		phandle = <0x10>;

		uart0 {
			phandle = <0x11>;
			pins = <0x00234567 0x1 0x03100000 0x0>;
		};
	};

	serial@70000000 {
		pinctrl-0 = <0x11>;
	};
};
"#,
        )
        .unwrap();
        let analyzer = Analyzer::new(&tree);
        let pinctrl = find(&tree, "pinctrl@402a0000");

        assert_eq!(analyzer.pinctrl_controllers(), vec![pinctrl]);
        let usage = analyzer.pinctrl_usage(pinctrl).unwrap();
        assert_eq!(usage.keys().copied().collect::<Vec<_>>(), vec![0x31, 0x234]);
    }

    #[test]
    fn controllers_without_users_are_skipped() {
        let tree = from_str(
            r#"/ { compatible = "qcom,demo"; gpio@1 { compatible = "qcom,gpio"; gpio-controller; phandle = <0x1>; }; };"#,
        )
        .unwrap();

        assert!(Analyzer::new(&tree).report().unwrap().controllers.is_empty());
    }

    #[test]
    fn pinctrl_state_names() {
        for (key, exp) in [
            ("pinctrl-0", true),
            ("pinctrl-12", true),
            ("pinctrl-names", false),
            ("pinctrl-", false),
            ("pinctrl0", false),
        ] {
            assert_eq!(is_pinctrl_state(key), exp, "{key}");
        }
    }
}
