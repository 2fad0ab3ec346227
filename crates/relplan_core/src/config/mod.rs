//! Planner settings, readable and writable by name.

use std::sync::LazyLock;

use hashbrown::HashMap;
use relplan_error::{DbError, Result};

use crate::types::ScalarValue;

pub const DEFAULT_MAX_JOIN_LEAVES: usize = 16;

/// Leaf sets are tracked as bits of a u64.
pub const MAX_JOIN_LEAVES_LIMIT: usize = 64;

/// Configuration for planning a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub enable_join_reorder: bool,
    pub enable_subquery_decorrelation: bool,
    pub max_join_leaves: usize,
    pub explain_plans: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            enable_join_reorder: true,
            enable_subquery_decorrelation: true,
            max_join_leaves: DEFAULT_MAX_JOIN_LEAVES,
            explain_plans: false,
        }
    }
}

impl PlannerConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = get_setting(name)?;
        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = get_setting(name)?;
        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = get_setting(name)?;
        let scalar = (func.get)(&Self::default());
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names of all settings, sorted.
    pub fn setting_names() -> Vec<&'static str> {
        let mut names: Vec<_> = GET_SET_FUNCTIONS.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn get_setting(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS
        .get(name)
        .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))
}

struct SettingFunctions {
    set: fn(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()>,
    get: fn(conf: &PlannerConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: PlannerSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: PlannerSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<EnableJoinReorder>(&mut map);
    insert_setting::<EnableSubqueryDecorrelation>(&mut map);
    insert_setting::<MaxJoinLeaves>(&mut map);
    insert_setting::<ExplainPlans>(&mut map);

    map
});

pub trait PlannerSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()>;
    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue;
}

pub struct EnableJoinReorder;

impl PlannerSetting for EnableJoinReorder {
    const NAME: &'static str = "enable_join_reorder";
    const DESCRIPTION: &'static str =
        "Use the cost based planner to pick a join order. When disabled joins are planned as written";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        conf.enable_join_reorder = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        conf.enable_join_reorder.into()
    }
}

pub struct EnableSubqueryDecorrelation;

impl PlannerSetting for EnableSubqueryDecorrelation {
    const NAME: &'static str = "enable_subquery_decorrelation";
    const DESCRIPTION: &'static str =
        "Rewrite simple correlated scalar subqueries in the select list into outer joins";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        conf.enable_subquery_decorrelation = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        conf.enable_subquery_decorrelation.into()
    }
}

pub struct MaxJoinLeaves;

impl PlannerSetting for MaxJoinLeaves {
    const NAME: &'static str = "max_join_leaves";
    const DESCRIPTION: &'static str = "Maximum number of from clause leaves to consider for join ordering";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        if val < 1 {
            return Err(DbError::new("Max join leaves cannot be less than 1"));
        }
        if val > MAX_JOIN_LEAVES_LIMIT {
            return Err(DbError::new(format!(
                "Max join leaves cannot be greater than {MAX_JOIN_LEAVES_LIMIT}"
            )));
        }
        conf.max_join_leaves = val;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        (conf.max_join_leaves as i64).into()
    }
}

pub struct ExplainPlans;

impl PlannerSetting for ExplainPlans {
    const NAME: &'static str = "explain_plans";
    const DESCRIPTION: &'static str = "Log the explain output of every plan at info level";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut PlannerConfig) -> Result<()> {
        conf.explain_plans = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &PlannerConfig) -> ScalarValue {
        conf.explain_plans.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_setting_exists() {
        let mut conf = PlannerConfig::default();
        conf.set_from_scalar("enable_join_reorder", false.into())
            .unwrap();

        let val = conf.get_as_scalar("enable_join_reorder").unwrap();
        assert_eq!(ScalarValue::Boolean(false), val);
        assert!(!conf.enable_join_reorder);
    }

    #[test]
    fn set_setting_not_exists() {
        let mut conf = PlannerConfig::default();
        conf.set_from_scalar("hello_world", 58.into()).unwrap_err();
        conf.get_as_scalar("hello_world").unwrap_err();
    }

    #[test]
    fn set_wrong_type() {
        let mut conf = PlannerConfig::default();
        conf.set_from_scalar("explain_plans", "yes".into())
            .unwrap_err();
    }

    #[test]
    fn max_join_leaves_bounds() {
        let mut conf = PlannerConfig::default();
        conf.set_from_scalar("max_join_leaves", 0.into()).unwrap_err();
        conf.set_from_scalar("max_join_leaves", 65.into()).unwrap_err();
        conf.set_from_scalar("max_join_leaves", 64.into()).unwrap();
        assert_eq!(64, conf.max_join_leaves);
    }

    #[test]
    fn reset_to_default() {
        let mut conf = PlannerConfig::default();
        conf.set_from_scalar("max_join_leaves", 4.into()).unwrap();
        conf.set_from_scalar("explain_plans", true.into()).unwrap();

        conf.reset("max_join_leaves").unwrap();
        assert_eq!(DEFAULT_MAX_JOIN_LEAVES, conf.max_join_leaves);
        assert!(conf.explain_plans);

        conf.reset_all();
        assert_eq!(PlannerConfig::default(), conf);
    }

    #[test]
    fn setting_names_sorted() {
        assert_eq!(
            vec![
                "enable_join_reorder",
                "enable_subquery_decorrelation",
                "explain_plans",
                "max_join_leaves",
            ],
            PlannerConfig::setting_names()
        );
    }
}
