//! The fixed rule set, in priority order.

use serde::{Deserialize, Serialize};

use super::types::{EventKind, Rule, RuleInputs, RuleMatch};
use crate::feeds::AdapterId;

/// Attached verbatim to every emitted event.
pub const GUARDRAILS: [&str; 5] = [
    "Max risk per trade 1% of equity",
    "Hard stop-loss set before entry",
    "No averaging down into losing positions",
    "Re-check WSPS band before adding size",
    "Stand aside if any feed turns stale",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub capitulation_vix_min: f64,
    pub capitulation_flow_max_usd: f64,
    pub capitulation_wsps_below: u8,

    pub flush_vix_min: f64,
    pub flush_flow_min_usd: f64,
    pub flush_wsps_min: u8,

    pub macro_window_mins: f64,

    pub squeeze_dxy_change_min_pct: f64,
    pub squeeze_us10y_min_pct: f64,

    pub momentum_vix_max: f64,
    pub momentum_flow_min_usd: f64,
    pub momentum_wsps_min: u8,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            capitulation_vix_min: 30.0,
            capitulation_flow_max_usd: -50e6,
            capitulation_wsps_below: 40,
            flush_vix_min: 22.0,
            flush_flow_min_usd: 10e6,
            flush_wsps_min: 50,
            macro_window_mins: 60.0,
            squeeze_dxy_change_min_pct: 0.5,
            squeeze_us10y_min_pct: 4.5,
            momentum_vix_max: 16.0,
            momentum_flow_min_usd: 50e6,
            momentum_wsps_min: 70,
        }
    }
}

pub fn default_rules(t: &RuleThresholds) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(CapitulationDefense(t.clone())),
        Box::new(FlushRebound(t.clone())),
        Box::new(MacroEventHold(t.clone())),
        Box::new(DollarSqueeze(t.clone())),
        Box::new(MomentumAdd(t.clone())),
    ]
}

fn usd_m(v: f64) -> String {
    format!("{:+.1}M", v / 1e6)
}

pub struct CapitulationDefense(pub RuleThresholds);

impl Rule for CapitulationDefense {
    fn kind(&self) -> EventKind {
        EventKind::CapitulationDefense
    }

    fn feeds(&self) -> &'static [AdapterId] {
        &[AdapterId::Indices, AdapterId::EtfFlow]
    }

    fn evaluate(&self, i: &RuleInputs) -> Option<RuleMatch> {
        let (vix, flow) = (i.vix?, i.etf_btc_flow_usd?);
        if vix < self.0.capitulation_vix_min
            || flow > self.0.capitulation_flow_max_usd
            || i.wsps_score >= self.0.capitulation_wsps_below
        {
            return None;
        }

        Some(RuleMatch {
            rationale: vec![
                format!("VIX {vix:.1} at or above {:.1}", self.0.capitulation_vix_min),
                format!("BTC ETF net flow {} (heavy redemptions)", usd_m(flow)),
                format!("WSPS {} below {}", i.wsps_score, self.0.capitulation_wsps_below),
            ],
            sizing_note: "Cut gross exposure by half; no new longs until flows stabilise".into(),
        })
    }
}

pub struct FlushRebound(pub RuleThresholds);

impl Rule for FlushRebound {
    fn kind(&self) -> EventKind {
        EventKind::FlushRebound
    }

    fn feeds(&self) -> &'static [AdapterId] {
        &[AdapterId::Indices, AdapterId::EtfFlow]
    }

    fn evaluate(&self, i: &RuleInputs) -> Option<RuleMatch> {
        let (vix, flow) = (i.vix?, i.etf_btc_flow_usd?);
        if vix < self.0.flush_vix_min
            || flow < self.0.flush_flow_min_usd
            || i.wsps_score < self.0.flush_wsps_min
        {
            return None;
        }

        Some(RuleMatch {
            rationale: vec![
                format!("VIX spike {vix:.1} at or above {:.1}", self.0.flush_vix_min),
                format!("BTC ETF net inflow {} despite volatility", usd_m(flow)),
                format!("WSPS {} holding at or above {}", i.wsps_score, self.0.flush_wsps_min),
            ],
            sizing_note: "Starter position at one third of normal size; scale only on follow-through"
                .into(),
        })
    }
}

pub struct MacroEventHold(pub RuleThresholds);

impl Rule for MacroEventHold {
    fn kind(&self) -> EventKind {
        EventKind::MacroEventHold
    }

    fn feeds(&self) -> &'static [AdapterId] {
        &[AdapterId::Calendar]
    }

    fn evaluate(&self, i: &RuleInputs) -> Option<RuleMatch> {
        let mins = i.minutes_to_high_impact?;
        if !(0.0..=self.0.macro_window_mins).contains(&mins) {
            return None;
        }

        let title = i.next_event_title.as_deref().unwrap_or("high-impact event");
        Some(RuleMatch {
            rationale: vec![
                format!("{title} starts in {mins:.0} min"),
                format!("Inside the {:.0} min pre-event window", self.0.macro_window_mins),
            ],
            sizing_note: "Hold current size; no new entries until the release has printed".into(),
        })
    }
}

pub struct DollarSqueeze(pub RuleThresholds);

impl Rule for DollarSqueeze {
    fn kind(&self) -> EventKind {
        EventKind::DollarSqueeze
    }

    fn feeds(&self) -> &'static [AdapterId] {
        &[AdapterId::RatesFx]
    }

    fn evaluate(&self, i: &RuleInputs) -> Option<RuleMatch> {
        let (dxy_chg, us10y) = (i.dxy_change_pct?, i.us10y_yield_pct?);
        if dxy_chg < self.0.squeeze_dxy_change_min_pct || us10y < self.0.squeeze_us10y_min_pct {
            return None;
        }

        Some(RuleMatch {
            rationale: vec![
                format!("DXY up {dxy_chg:+.2}% on the day"),
                format!("US10Y at {us10y:.2}%, at or above {:.2}%", self.0.squeeze_us10y_min_pct),
            ],
            sizing_note: "Trim risk-on exposure by a quarter while the dollar bid persists".into(),
        })
    }
}

pub struct MomentumAdd(pub RuleThresholds);

impl Rule for MomentumAdd {
    fn kind(&self) -> EventKind {
        EventKind::MomentumAdd
    }

    fn feeds(&self) -> &'static [AdapterId] {
        &[AdapterId::Indices, AdapterId::EtfFlow]
    }

    fn evaluate(&self, i: &RuleInputs) -> Option<RuleMatch> {
        let (vix, flow) = (i.vix?, i.etf_btc_flow_usd?);
        if vix > self.0.momentum_vix_max
            || flow < self.0.momentum_flow_min_usd
            || i.wsps_score < self.0.momentum_wsps_min
        {
            return None;
        }

        Some(RuleMatch {
            rationale: vec![
                format!("VIX calm at {vix:.1}"),
                format!("BTC ETF net inflow {}", usd_m(flow)),
                format!("WSPS {} in the {:?} band", i.wsps_score, i.wsps_band),
            ],
            sizing_note: "Add up to one normal unit; trail stops under the last higher low".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsps::Band;

    fn inputs() -> RuleInputs {
        RuleInputs {
            vix: Some(19.0),
            etf_btc_flow_usd: Some(0.0),
            us10y_yield_pct: Some(4.0),
            dxy_change_pct: Some(0.0),
            minutes_to_high_impact: None,
            next_event_title: None,
            wsps_score: 50,
            wsps_band: Band::Yellow,
        }
    }

    fn matching(i: &RuleInputs) -> Vec<EventKind> {
        default_rules(&RuleThresholds::default())
            .iter()
            .filter(|r| r.evaluate(i).is_some())
            .map(|r| r.kind())
            .collect()
    }

    #[test]
    fn rules_are_in_priority_order() {
        let kinds: Vec<_> = default_rules(&RuleThresholds::default())
            .iter()
            .map(|r| r.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::CapitulationDefense,
                EventKind::FlushRebound,
                EventKind::MacroEventHold,
                EventKind::DollarSqueeze,
                EventKind::MomentumAdd,
            ]
        );
    }

    #[test]
    fn quiet_market_matches_nothing() {
        assert!(matching(&inputs()).is_empty());
    }

    #[test]
    fn flush_rebound_scenario() {
        let i = RuleInputs {
            vix: Some(24.0),
            etf_btc_flow_usd: Some(15e6),
            wsps_score: 62,
            ..inputs()
        };
        assert_eq!(matching(&i), vec![EventKind::FlushRebound]);

        let m = FlushRebound(RuleThresholds::default()).evaluate(&i).unwrap();
        assert_eq!(m.rationale.len(), 3);
        assert!(m.rationale[1].contains("+15.0M"));
    }

    #[test]
    fn capitulation_needs_all_three_legs() {
        let i = RuleInputs {
            vix: Some(32.0),
            etf_btc_flow_usd: Some(-80e6),
            wsps_score: 35,
            ..inputs()
        };
        assert_eq!(matching(&i), vec![EventKind::CapitulationDefense]);

        let i = RuleInputs { wsps_score: 40, ..i };
        assert!(matching(&i).is_empty());
    }

    #[test]
    fn macro_hold_only_inside_window() {
        let mut i = inputs();
        i.minutes_to_high_impact = Some(45.0);
        i.next_event_title = Some("FOMC".into());
        assert_eq!(matching(&i), vec![EventKind::MacroEventHold]);

        i.minutes_to_high_impact = Some(61.0);
        assert!(matching(&i).is_empty());
    }

    #[test]
    fn dollar_squeeze_and_momentum() {
        let i = RuleInputs {
            dxy_change_pct: Some(0.6),
            us10y_yield_pct: Some(4.6),
            ..inputs()
        };
        assert_eq!(matching(&i), vec![EventKind::DollarSqueeze]);

        let i = RuleInputs {
            vix: Some(14.0),
            etf_btc_flow_usd: Some(60e6),
            wsps_score: 75,
            wsps_band: Band::Green,
            ..inputs()
        };
        assert_eq!(matching(&i), vec![EventKind::MomentumAdd]);
    }

    #[test]
    fn missing_inputs_never_match() {
        let i = RuleInputs {
            vix: None,
            etf_btc_flow_usd: Some(15e6),
            wsps_score: 62,
            ..inputs()
        };
        assert!(matching(&i).is_empty());
    }
}
