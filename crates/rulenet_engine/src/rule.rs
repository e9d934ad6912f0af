//! Rule definitions and compiled rules.
//!
//! A rule is a linear chain of patterns. Pattern 0 is matched on its own;
//! every later pattern joins the partial match built so far with one more
//! fact. Conditions are opaque closures: the engine never inspects them,
//! it only calls them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rulenet_foundation::{Error, Result, Value};
use rulenet_network::TerminalIdentity;

use crate::session::RuleContext;

/// Package used when a rule does not name one.
pub const DEFAULT_PACKAGE: &str = "default";

/// Consequence name of a rule's main consequence.
pub const DEFAULT_CONSEQUENCE: &str = "default";

/// Agenda group used when a rule does not name one.
pub const MAIN_GROUP: &str = "MAIN";

type FilterFn = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;
type LeftKeyFn = Arc<dyn Fn(&[&Value]) -> Value + Send + Sync>;
type RightKeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
type BetaFn = Arc<dyn Fn(&[&Value], &Value) -> Result<bool> + Send + Sync>;
type SalienceFn = Arc<dyn Fn(&[&Value]) -> Result<i32> + Send + Sync>;
pub(crate) type ConsequenceFn = Arc<dyn Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Join Spec
// =============================================================================

/// Equality join between the partial match and the next pattern's fact.
///
/// The left key is computed from the facts matched so far, the right key
/// from the candidate fact. Keys are hashed to pick a memory bucket, then
/// compared for equality.
#[derive(Clone)]
pub struct JoinSpec {
    left: LeftKeyFn,
    right: RightKeyFn,
}

impl JoinSpec {
    /// Creates a join from two key extractors.
    pub fn new<L, R>(left: L, right: R) -> Self
    where
        L: Fn(&[&Value]) -> Value + Send + Sync + 'static,
        R: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self {
            left: Arc::new(left),
            right: Arc::new(right),
        }
    }

    /// Joins `facts[position].left_field` with the candidate's `right_field`.
    ///
    /// Missing fields read as `Nil`.
    #[must_use]
    pub fn fields(position: usize, left_field: &str, right_field: &str) -> Self {
        let left_field: Arc<str> = Arc::from(left_field);
        let right_field: Arc<str> = Arc::from(right_field);
        Self::new(
            move |facts| {
                facts
                    .get(position)
                    .and_then(|v| v.field(&left_field))
                    .cloned()
                    .unwrap_or(Value::Nil)
            },
            move |value| value.field(&right_field).cloned().unwrap_or(Value::Nil),
        )
    }

    /// Key of a partial match.
    #[must_use]
    pub fn left_key(&self, facts: &[&Value]) -> Value {
        (self.left)(facts)
    }

    /// Key of a candidate fact.
    #[must_use]
    pub fn right_key(&self, value: &Value) -> Value {
        (self.right)(value)
    }
}

impl fmt::Debug for JoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JoinSpec(..)")
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// Where a pattern draws its facts from.
///
/// Matches materialised by the declarative agenda live in their own entry
/// point, so ordinary patterns never see them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// Working-memory facts.
    #[default]
    Facts,
    /// Materialised rule matches ([`Value::Match`]).
    Matches,
}

/// One condition of a rule.
#[derive(Clone)]
pub struct Pattern {
    entry: EntryPoint,
    filter: FilterFn,
    join: Option<JoinSpec>,
    test: Option<BetaFn>,
}

impl Pattern {
    /// A pattern every fact satisfies.
    #[must_use]
    pub fn any() -> Self {
        Self::try_matching(|_| Ok(true))
    }

    /// A pattern with an infallible single-fact condition.
    pub fn matching<F>(filter: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::try_matching(move |value| Ok(filter(value)))
    }

    /// A pattern with a fallible single-fact condition.
    ///
    /// Errors surface from the session call that inserted or updated the
    /// fact.
    pub fn try_matching<F>(filter: F) -> Self
    where
        F: Fn(&Value) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            entry: EntryPoint::Facts,
            filter: Arc::new(filter),
            join: None,
            test: None,
        }
    }

    /// Matches every materialised activation, for meta-rules.
    #[must_use]
    pub fn activations() -> Self {
        Self {
            entry: EntryPoint::Matches,
            ..Self::any()
        }
    }

    /// Matches materialised activations of the named rule.
    #[must_use]
    pub fn activations_of(rule: &str) -> Self {
        let rule: Arc<str> = Arc::from(rule);
        Self {
            entry: EntryPoint::Matches,
            ..Self::matching(move |fact| fact.as_match().is_some_and(|m| m.rule == rule))
        }
    }

    /// Matches records whose `field` equals `value`.
    #[must_use]
    pub fn field_eq(field: &str, value: impl Into<Value>) -> Self {
        let field: Arc<str> = Arc::from(field);
        let value = value.into();
        Self::matching(move |fact| fact.field(&field) == Some(&value))
    }

    /// Adds an equality join against the partial match.
    #[must_use]
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    /// Adds an infallible test over the partial match and candidate fact.
    #[must_use]
    pub fn test<F>(self, test: F) -> Self
    where
        F: Fn(&[&Value], &Value) -> bool + Send + Sync + 'static,
    {
        self.try_test(move |left, right| Ok(test(left, right)))
    }

    /// Adds a fallible test over the partial match and candidate fact.
    ///
    /// Errors surface from the fire call whose flush evaluated the join.
    #[must_use]
    pub fn try_test<F>(mut self, test: F) -> Self
    where
        F: Fn(&[&Value], &Value) -> Result<bool> + Send + Sync + 'static,
    {
        self.test = Some(Arc::new(test));
        self
    }

    /// Evaluates the single-fact condition.
    ///
    /// # Errors
    /// Propagates the condition's error.
    pub fn accepts(&self, value: &Value) -> Result<bool> {
        let from_matches = value.as_match().is_some();
        if from_matches != (self.entry == EntryPoint::Matches) {
            return Ok(false);
        }
        (self.filter)(value)
    }

    /// Entry point this pattern reads.
    #[must_use]
    pub fn entry_point(&self) -> EntryPoint {
        self.entry
    }

    /// The equality join, if any.
    #[must_use]
    pub fn join_spec(&self) -> Option<&JoinSpec> {
        self.join.as_ref()
    }

    /// Returns true if this pattern carries a test.
    #[must_use]
    pub fn has_test(&self) -> bool {
        self.test.is_some()
    }

    /// Returns true if this pattern carries a join or a test.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.join.is_some() || self.test.is_some()
    }

    /// Evaluates the join test; patterns without one always pass.
    ///
    /// # Errors
    /// Propagates the test's error.
    pub fn beta(&self, left: &[&Value], right: &Value) -> Result<bool> {
        match &self.test {
            Some(test) => test(left, right),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("entry", &self.entry)
            .field("join", &self.join.is_some())
            .field("test", &self.test.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Salience
// =============================================================================

/// Firing priority; higher fires first.
#[derive(Clone)]
pub enum Salience {
    /// Constant priority.
    Fixed(i32),
    /// Priority computed from the matched facts whenever a match is created
    /// or updated.
    Dynamic(SalienceFn),
}

impl Salience {
    /// Resolves the priority for a match.
    ///
    /// # Errors
    /// Propagates the dynamic expression's error.
    pub fn evaluate(&self, facts: &[&Value]) -> Result<i32> {
        match self {
            Self::Fixed(value) => Ok(*value),
            Self::Dynamic(expr) => expr(facts),
        }
    }

    /// Returns true for [`Salience::Dynamic`].
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl Default for Salience {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl fmt::Debug for Salience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "Fixed({value})"),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

// =============================================================================
// Rule Definition
// =============================================================================

/// A rule as authored, before validation.
#[derive(Clone)]
pub struct RuleDefinition {
    name: Arc<str>,
    package: Arc<str>,
    consequence_name: Arc<str>,
    salience: Salience,
    no_loop: bool,
    lock_on_active: bool,
    auto_focus: bool,
    agenda_group: Arc<str>,
    patterns: Vec<Pattern>,
    consequence: Option<ConsequenceFn>,
}

impl RuleDefinition {
    /// Starts a rule in the default package and `MAIN` agenda group.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            package: Arc::from(DEFAULT_PACKAGE),
            consequence_name: Arc::from(DEFAULT_CONSEQUENCE),
            salience: Salience::default(),
            no_loop: false,
            lock_on_active: false,
            auto_focus: false,
            agenda_group: Arc::from(MAIN_GROUP),
            patterns: Vec::new(),
            consequence: None,
        }
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the package.
    #[must_use]
    pub fn package(mut self, package: impl Into<Arc<str>>) -> Self {
        self.package = package.into();
        self
    }

    /// Sets the consequence name.
    #[must_use]
    pub fn consequence_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.consequence_name = name.into();
        self
    }

    /// Sets a constant salience.
    #[must_use]
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = Salience::Fixed(salience);
        self
    }

    /// Sets a salience computed from the matched facts.
    #[must_use]
    pub fn dynamic_salience<F>(mut self, expr: F) -> Self
    where
        F: Fn(&[&Value]) -> Result<i32> + Send + Sync + 'static,
    {
        self.salience = Salience::Dynamic(Arc::new(expr));
        self
    }

    /// Sets the no-loop flag.
    #[must_use]
    pub fn no_loop(mut self, enabled: bool) -> Self {
        self.no_loop = enabled;
        self
    }

    /// Sets the lock-on-active flag.
    #[must_use]
    pub fn lock_on_active(mut self, enabled: bool) -> Self {
        self.lock_on_active = enabled;
        self
    }

    /// Sets the auto-focus flag.
    #[must_use]
    pub fn auto_focus(mut self, enabled: bool) -> Self {
        self.auto_focus = enabled;
        self
    }

    /// Sets the agenda group.
    #[must_use]
    pub fn agenda_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.agenda_group = group.into();
        self
    }

    /// Appends a pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Sets the consequence.
    #[must_use]
    pub fn then<F>(mut self, consequence: F) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.consequence = Some(Arc::new(consequence));
        self
    }

    /// Validates the rule on its own and freezes it.
    ///
    /// A rule without a consequence compiles to one that does nothing.
    ///
    /// # Errors
    /// Returns `Build` if the rule has no patterns or its first pattern
    /// carries a join or test.
    pub fn compile(self) -> Result<CompiledRule> {
        let identity = TerminalIdentity::new(
            self.name.clone(),
            self.package.clone(),
            self.consequence_name.clone(),
        );
        if self.patterns.is_empty() {
            return Err(Error::build(format!("rule {identity} has no patterns")));
        }
        if self.patterns[0].is_joined() {
            return Err(Error::build(format!(
                "rule {identity}: the first pattern has nothing to join with"
            )));
        }
        Ok(CompiledRule {
            identity,
            salience: self.salience,
            no_loop: self.no_loop,
            lock_on_active: self.lock_on_active,
            auto_focus: self.auto_focus,
            agenda_group: self.agenda_group,
            patterns: self.patterns,
            consequence: self.consequence.unwrap_or_else(|| Arc::new(|_| Ok(()))),
        })
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("package", &self.package)
            .field("patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Compiled Rule
// =============================================================================

/// A validated rule, shared by every session built from it.
#[derive(Clone)]
pub struct CompiledRule {
    identity: TerminalIdentity,
    salience: Salience,
    no_loop: bool,
    lock_on_active: bool,
    auto_focus: bool,
    agenda_group: Arc<str>,
    patterns: Vec<Pattern>,
    pub(crate) consequence: ConsequenceFn,
}

impl CompiledRule {
    /// Terminal node identity: rule, package and consequence name.
    #[must_use]
    pub fn identity(&self) -> &TerminalIdentity {
        &self.identity
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.rule
    }

    /// Package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.identity.package
    }

    /// Salience expression.
    #[must_use]
    pub fn salience(&self) -> &Salience {
        &self.salience
    }

    /// No-loop flag.
    #[must_use]
    pub fn no_loop(&self) -> bool {
        self.no_loop
    }

    /// Lock-on-active flag.
    #[must_use]
    pub fn lock_on_active(&self) -> bool {
        self.lock_on_active
    }

    /// Auto-focus flag.
    #[must_use]
    pub fn auto_focus(&self) -> bool {
        self.auto_focus
    }

    /// Agenda group name.
    #[must_use]
    pub fn agenda_group(&self) -> &str {
        &self.agenda_group
    }

    /// Patterns in chain order.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Number of patterns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if any pattern reads materialised matches.
    ///
    /// Matches of such meta-rules are never materialised themselves, so a
    /// meta-rule cannot match its own activations.
    #[must_use]
    pub fn reads_matches(&self) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.entry_point() == EntryPoint::Matches)
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("identity", &self.identity)
            .field("salience", &self.salience)
            .field("no_loop", &self.no_loop)
            .field("lock_on_active", &self.lock_on_active)
            .field("auto_focus", &self.auto_focus)
            .field("agenda_group", &self.agenda_group)
            .field("patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

/// Checks that no two rules share a terminal identity.
///
/// # Errors
/// Returns `Build` naming the first duplicate.
pub fn check_unique(rules: &[CompiledRule]) -> Result<()> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.identity()) {
            return Err(Error::build(format!(
                "duplicate rule {}",
                rule.identity()
            )));
        }
    }
    Ok(())
}
