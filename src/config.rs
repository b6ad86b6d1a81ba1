use log::debug;

use crate::assignment::CrtcAssignment;
use crate::error::Result;
use crate::monitor::OutputInfo;
use crate::resources::{MonitorIdentity, ScreenResources};

/// Used when an output reports neither a preferred mode nor any mode at all.
const FALLBACK_PREFERRED_SIZE: (i32, i32) = (1024, 768);

/// A complete desired layout: every output and whether they mirror each other.
///
/// Output order is significant: it drives the placement of disabled outputs
/// and the order in which the solver hands out CRTCs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    pub clone: bool,
    pub outputs: Vec<OutputInfo>,
}

impl Configuration {
    pub fn new(clone: bool, outputs: Vec<OutputInfo>) -> Configuration {
        Configuration { clone, outputs }
    }

    /// Describes what the display server is showing right now.
    pub fn new_current(screen: &ScreenResources) -> Configuration {
        let mut config = Configuration::default();
        let mut clone_size: Option<(i32, i32)> = None;

        for rr_output in &screen.outputs {
            let mut output = OutputInfo::new(rr_output.name.clone());
            output.connected = rr_output.connected;
            output.primary = rr_output.primary;

            if output.connected {
                match &rr_output.identity {
                    Some(identity) => {
                        output.vendor = identity.vendor.clone();
                        output.product = identity.product;
                        output.serial = identity.serial;
                    }
                    None => output.vendor = "???".to_string(),
                }
                output.display_name = Some(make_display_name(&rr_output.name, rr_output.identity.as_ref()));

                match screen.current_mode(rr_output) {
                    Some((crtc, mode)) => {
                        output.on = true;
                        output.x = crtc.x;
                        output.y = crtc.y;
                        output.width = mode.width;
                        output.height = mode.height;
                        output.rate = mode.rate;
                        output.rotation = crtc.current_rotation;

                        if output.x == 0 && output.y == 0 {
                            match clone_size {
                                None => clone_size = Some((output.width, output.height)),
                                Some(size) if size == (output.width, output.height) => config.clone = true,
                                Some(_) => {}
                            }
                        }
                    }
                    None => config.clone = false,
                }

                let preferred = screen
                    .preferred_mode(rr_output)
                    .or_else(|| screen.output_modes(rr_output).next());
                (output.pref_width, output.pref_height) = match preferred {
                    Some(mode) => (mode.width, mode.height),
                    None => FALLBACK_PREFERRED_SIZE,
                };
            }

            config.outputs.push(output);
        }

        config.place_disabled_outputs();
        debug!("current configuration: {config:?}");
        config
    }

    /// Lines connected but disabled outputs up right of everything lit, so
    /// they keep stable coordinates without going through the solver.
    fn place_disabled_outputs(&mut self) {
        let mut last_x = self
            .outputs
            .iter()
            .filter(|o| o.on)
            .map(|o| o.x.saturating_add(o.width))
            .fold(0, i32::max);

        for output in self.outputs.iter_mut().filter(|o| o.connected && !o.on) {
            output.x = last_x;
            last_x = output.x.saturating_add(output.width);
        }
    }

    pub fn find_output(&self, name: &str) -> Option<&OutputInfo> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn find_output_mut(&mut self, name: &str) -> Option<&mut OutputInfo> {
        self.outputs.iter_mut().find(|o| o.name == name)
    }

    /// Whether both configurations describe the same hardware setup.
    ///
    /// Only outputs of `self` are looked up in `other`, so the relation is
    /// not symmetric when `other` carries extra outputs.
    pub fn matches(&self, other: &Configuration) -> bool {
        self.outputs.iter().all(|output| {
            other
                .find_output(&output.name)
                .is_some_and(|theirs| output.matches(theirs))
        })
    }

    /// Whether applying either configuration would result in the same
    /// modes being set on the same outputs.
    pub fn equivalent(&self, other: &Configuration) -> bool {
        self.outputs.iter().all(|output| {
            other
                .find_output(&output.name)
                .is_some_and(|theirs| output.equivalent(theirs))
        })
    }

    /// Moves the layout so it starts at the origin and keeps only the first
    /// output flagged as primary.
    pub fn sanitize(&mut self) {
        let lit = self.outputs.iter().filter(|o| o.on);
        let x_offset = lit.clone().map(|o| o.x).min();
        let y_offset = lit.map(|o| o.y).min();

        if let (Some(x_offset), Some(y_offset)) = (x_offset, y_offset) {
            for output in self.outputs.iter_mut().filter(|o| o.on) {
                output.x = output.x.saturating_sub(x_offset);
                output.y = output.y.saturating_sub(y_offset);
            }
        }

        let mut found = false;
        for output in self.outputs.iter_mut().filter(|o| o.primary) {
            if found {
                output.primary = false;
            }
            found = true;
        }
    }

    pub fn primary(&self) -> Option<&OutputInfo> {
        self.outputs.iter().find(|o| o.primary)
    }

    /// Output list the solver should be fed.
    ///
    /// In clone mode every lit output takes the size and rotation of the
    /// first lit one and moves to the origin.
    pub fn make_outputs(&self) -> Vec<OutputInfo> {
        let first_on = self.outputs.iter().find(|o| o.on);

        self.outputs
            .iter()
            .map(|old| {
                let mut new = old.clone();
                if let (true, true, Some(first_on)) = (self.clone, new.on, first_on) {
                    new.width = first_on.width;
                    new.height = first_on.height;
                    new.rotation = first_on.rotation;
                    new.x = 0;
                    new.y = 0;
                }
                new
            })
            .collect()
    }

    /// Dry run: can this configuration be realised on `screen`?
    pub fn applicable(&self, screen: &ScreenResources) -> Result<()> {
        CrtcAssignment::new(screen, &self.make_outputs()).map(|_| ())
    }
}

fn make_display_name(connector: &str, identity: Option<&MonitorIdentity>) -> String {
    match identity {
        Some(identity) => match &identity.model {
            Some(model) => format!("{model} ({connector})"),
            None if !identity.vendor.is_empty() => format!("{} {connector}", identity.vendor),
            None => connector.to_string(),
        },
        None => format!("Unknown ({connector})"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::monitor::Rotation;
    use crate::resources::fixtures::{self, dual_head, light};
    use proptest::prelude::*;

    pub(crate) fn lit(name: &str, x: i32, y: i32, width: i32, height: i32) -> OutputInfo {
        OutputInfo {
            connected: true,
            on: true,
            x,
            y,
            width,
            height,
            rate: 60,
            vendor: "DEL".into(),
            product: 1,
            serial: name.len() as u32,
            ..OutputInfo::new(name)
        }
    }

    #[test]
    fn current_configuration_from_live_screen() {
        let mut screen = dual_head();
        light(&mut screen, 100, 10, 1, 0, 0);
        screen.outputs[0].primary = true;

        let config = Configuration::new_current(&screen);
        assert!(!config.clone);
        let dp = config.find_output("DP-1").unwrap();
        assert!(dp.on && dp.primary);
        assert_eq!((dp.x, dp.y, dp.width, dp.height, dp.rate), (0, 0, 1920, 1080, 60));
        assert_eq!(dp.vendor, "DEL");

        // Connected but dark: placed right of the lit output.
        let hdmi = config.find_output("HDMI-1").unwrap();
        assert!(hdmi.connected && !hdmi.on);
        assert_eq!(hdmi.x, 1920);
        assert_eq!((hdmi.pref_width, hdmi.pref_height), (1920, 1080));
        assert!(config.matches(&config));
    }

    #[test]
    fn same_size_outputs_at_origin_are_clones() {
        let mut screen = dual_head();
        light(&mut screen, 100, 10, 1, 0, 0);
        light(&mut screen, 101, 11, 1, 0, 0);
        assert!(Configuration::new_current(&screen).clone);

        let mut screen = dual_head();
        light(&mut screen, 100, 10, 1, 0, 0);
        light(&mut screen, 101, 11, 3, 0, 0);
        assert!(!Configuration::new_current(&screen).clone);
    }

    #[test]
    fn clone_reference_is_first_origin_output_only() {
        let mut screen = dual_head();
        screen.crtcs.push(fixtures::crtc(13, &[102]));
        screen.outputs.push(fixtures::output(102, "VGA-1", &[1, 3], &[13]));
        light(&mut screen, 100, 10, 3, 0, 0);
        light(&mut screen, 101, 11, 1, 0, 0);
        light(&mut screen, 102, 13, 3, 0, 0);
        // HDMI-1 disagrees with DP-1 but VGA-1 agrees, which is enough.
        assert!(Configuration::new_current(&screen).clone);
    }

    #[test]
    fn disconnected_outputs_keep_sentinel_geometry() {
        let mut screen = dual_head();
        screen.outputs[1].connected = false;
        screen.outputs[1].identity = None;
        let config = Configuration::new_current(&screen);
        let hdmi = config.find_output("HDMI-1").unwrap();
        assert_eq!((hdmi.x, hdmi.y, hdmi.width, hdmi.height, hdmi.rate), (-1, -1, -1, -1, -1));
        assert_eq!(hdmi.rotation, Rotation::ROTATE_0);
        assert!(hdmi.vendor.is_empty());
    }

    #[test]
    fn unknown_monitor_gets_placeholder_identity() {
        let mut screen = dual_head();
        screen.outputs[0].identity = None;
        screen.outputs[0].modes.clear();
        screen.outputs[0].preferred_mode = None;
        let config = Configuration::new_current(&screen);
        let dp = config.find_output("DP-1").unwrap();
        assert_eq!(dp.vendor, "???");
        assert_eq!((dp.pref_width, dp.pref_height), FALLBACK_PREFERRED_SIZE);
        assert_eq!(dp.display_name.as_deref(), Some("Unknown (DP-1)"));
    }

    #[test]
    fn disabled_outputs_are_lined_up_after_rightmost_edge() {
        let mut a = lit("A", 0, 0, 1920, 1080);
        a.on = false;
        let b = lit("B", 100, 0, 1280, 1024);
        let mut c = lit("C", 0, 0, 800, 600);
        c.on = false;
        let mut config = Configuration::new(false, vec![a, b, c]);
        config.place_disabled_outputs();
        assert_eq!(config.outputs[0].x, 1380);
        assert_eq!(config.outputs[2].x, 1380 + 1920);
    }

    #[test]
    fn matches_is_one_sided() {
        let small = Configuration::new(false, vec![lit("A", 0, 0, 10, 10)]);
        let big = Configuration::new(false, vec![lit("A", 0, 0, 10, 10), lit("B", 10, 0, 10, 10)]);
        assert!(small.matches(&big));
        assert!(!big.matches(&small));
        assert!(!big.equivalent(&small));
    }

    #[test]
    fn sanitize_moves_to_origin_and_keeps_first_primary() {
        let mut a = lit("A", 200, -50, 100, 100);
        a.primary = true;
        let mut b = lit("B", 300, 100, 100, 100);
        b.primary = true;
        let mut off = lit("C", 7, 7, 100, 100);
        off.on = false;
        let mut config = Configuration::new(false, vec![a, b, off]);
        config.sanitize();

        assert_eq!((config.outputs[0].x, config.outputs[0].y), (0, 0));
        assert_eq!((config.outputs[1].x, config.outputs[1].y), (100, 150));
        assert_eq!((config.outputs[2].x, config.outputs[2].y), (7, 7));
        assert!(config.outputs[0].primary);
        assert!(!config.outputs[1].primary);
        assert_eq!(config.primary().map(|o| o.name.as_str()), Some("A"));
    }

    #[test]
    fn extreme_coordinates_saturate() {
        let mut config = Configuration::new(
            false,
            vec![lit("A", i32::MAX, 0, 100, 100), lit("B", -10, i32::MIN, 100, 100)],
        );
        config.sanitize();
        assert_eq!((config.outputs[0].x, config.outputs[0].y), (i32::MAX, i32::MAX));
        assert_eq!((config.outputs[1].x, config.outputs[1].y), (0, 0));

        let mut off = lit("C", 0, 0, 100, 100);
        off.on = false;
        let mut config = Configuration::new(false, vec![lit("A", i32::MAX - 10, 0, 100, 100), off]);
        config.place_disabled_outputs();
        assert_eq!(config.outputs[1].x, i32::MAX);
    }

    #[test]
    fn clone_mode_copies_first_lit_geometry() {
        let mut a = lit("A", 0, 0, 1920, 1080);
        a.rotation = Rotation::ROTATE_180;
        let b = lit("B", 1920, 0, 1280, 1024);
        let mut off = lit("C", 50, 50, 640, 480);
        off.on = false;
        let config = Configuration::new(true, vec![a, b, off]);
        let outputs = config.make_outputs();

        assert_eq!((outputs[1].x, outputs[1].y, outputs[1].width, outputs[1].height), (0, 0, 1920, 1080));
        assert_eq!(outputs[1].rotation, Rotation::ROTATE_180);
        assert_eq!((outputs[2].x, outputs[2].width), (50, 640));
        // The source configuration is untouched.
        assert_eq!(config.outputs[1].x, 1920);
    }

    #[test]
    fn applicable_runs_the_solver() {
        let screen = dual_head();
        let ok = Configuration::new(
            false,
            vec![lit("DP-1", 0, 0, 1920, 1080), lit("HDMI-1", 1920, 0, 1280, 1024)],
        );
        assert!(ok.applicable(&screen).is_ok());

        let bad = Configuration::new(false, vec![lit("HDMI-1", 0, 0, 640, 480)]);
        assert!(bad.applicable(&screen).is_err());
    }

    pub(crate) fn arb_output(name: &'static str) -> impl Strategy<Value = OutputInfo> {
        let geometry = (-4000..4000i32, -4000..4000i32, 1..4000i32, 1..4000i32);
        let mode = (
            prop::sample::select(vec![50, 60, 75, 144]),
            prop::sample::select(vec!["normal", "left", "upside_down", "right"]),
            any::<bool>(),
        );
        let identity = (
            prop::sample::select(vec!["DEL", "SAM", "GSM", ""]),
            any::<u16>(),
            any::<u32>(),
        );
        (any::<bool>(), any::<bool>(), geometry, mode, identity).prop_map(
            move |(on, primary, (x, y, width, height), (rate, rot, reflect), (vendor, product, serial))| {
                let mut rotation = Rotation::from_xml_name(rot).unwrap_or_default();
                if reflect {
                    rotation |= Rotation::REFLECT_X;
                }
                OutputInfo {
                    connected: true,
                    on,
                    primary,
                    x,
                    y,
                    width,
                    height,
                    rate,
                    rotation,
                    vendor: vendor.to_string(),
                    product,
                    serial,
                    ..OutputInfo::new(name)
                }
            },
        )
    }

    pub(crate) fn arb_configuration() -> impl Strategy<Value = Configuration> {
        (
            any::<bool>(),
            arb_output("DP-1"),
            arb_output("DP-2"),
            arb_output("HDMI-1"),
            0..=3usize,
        )
            .prop_map(|(clone, a, b, c, keep)| {
                let mut outputs = vec![a, b, c];
                outputs.truncate(keep);
                Configuration::new(clone, outputs)
            })
    }

    proptest! {
        #[test]
        fn match_and_equivalence_are_reflexive(config in arb_configuration()) {
            prop_assert!(config.matches(&config));
            prop_assert!(config.equivalent(&config));
        }

        #[test]
        fn equivalence_implies_match(a in arb_configuration(), b in arb_configuration()) {
            if a.equivalent(&b) {
                prop_assert!(a.matches(&b));
            }
        }

        #[test]
        fn sanitize_is_idempotent(config in arb_configuration()) {
            let mut once = config.clone();
            once.sanitize();
            let mut twice = once.clone();
            twice.sanitize();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn sanitize_anchors_at_origin(config in arb_configuration()) {
            let mut config = config;
            config.sanitize();
            let lit: Vec<_> = config.outputs.iter().filter(|o| o.on).collect();
            if !lit.is_empty() {
                prop_assert_eq!(lit.iter().map(|o| o.x).min(), Some(0));
                prop_assert_eq!(lit.iter().map(|o| o.y).min(), Some(0));
            }
            prop_assert!(config.outputs.iter().filter(|o| o.primary).count() <= 1);
        }
    }
}
