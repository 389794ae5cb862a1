/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::common::BusError;
use crate::pipeline::ProbeContext;
use crate::saga::activity::ActivityChain;
use crate::saga::event::EventDefinition;
use crate::saga::{
    Correlation, Event, EventActivityBinder, MissingInstancePolicy, SagaInstance, State, FINAL,
    INITIAL,
};
use crate::traits::{BusMessage, Probe};

type Erased = Arc<dyn Any + Send + Sync>;

struct Transition {
    chain: Erased,
    activities: Vec<&'static str>,
    targets: Vec<Arc<str>>,
}

/// The immutable state/event table of one saga type.
///
/// Built once by [`StateMachineBuilder`] and shared by every concurrent
/// transition. Transitions are keyed by `(state name, event name)`.
pub struct StateMachine<I> {
    name: String,
    states: Vec<State>,
    events: HashMap<TypeId, Erased>,
    event_names: Vec<Arc<str>>,
    transitions: BTreeMap<Arc<str>, BTreeMap<Arc<str>, Transition>>,
    ignored: BTreeMap<Arc<str>, BTreeSet<Arc<str>>>,
    completed_when_finalized: bool,
    _instance: PhantomData<fn() -> I>,
}

impl<I> Debug for StateMachine<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("states", &self.states)
            .field("events", &self.event_names)
            .field("completed_when_finalized", &self.completed_when_finalized)
            .finish_non_exhaustive()
    }
}

impl<I: SagaInstance> StateMachine<I> {
    pub fn builder(name: impl Into<String>) -> StateMachineBuilder<I> {
        StateMachineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared states, excluding `Initial` and `Final`.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn completed_when_finalized(&self) -> bool {
        self.completed_when_finalized
    }

    /// `true` when `event` may create an instance.
    pub fn initiates(&self, event: &str) -> bool {
        self.transitions
            .get(INITIAL)
            .is_some_and(|events| events.contains_key(event))
    }

    /// `true` when `event` is explicitly ignored in `state`.
    pub fn is_ignored(&self, state: &str, event: &str) -> bool {
        self.ignored
            .get(state)
            .is_some_and(|events| events.contains(event))
    }

    /// `true` when some transition handles `event` in `state`.
    pub fn accepts(&self, state: &str, event: &str) -> bool {
        self.transitions
            .get(state)
            .is_some_and(|events| events.contains_key(event))
    }

    /// The activity names of the `(state, event)` transition.
    pub fn activities(&self, state: &str, event: &str) -> Option<&[&'static str]> {
        self.transition(state, event)
            .map(|transition| transition.activities.as_slice())
    }

    pub(crate) fn event_definition<M>(&self) -> Option<&EventDefinition<I, M>>
    where
        M: BusMessage + Clone,
    {
        self.events
            .get(&TypeId::of::<M>())
            .and_then(|definition| definition.downcast_ref::<EventDefinition<I, M>>())
    }

    pub(crate) fn chain<M>(&self, state: &str, event: &str) -> Option<&ActivityChain<I, M>>
    where
        M: BusMessage + Clone,
    {
        self.transition(state, event)
            .and_then(|transition| transition.chain.downcast_ref::<ActivityChain<I, M>>())
    }

    fn transition(&self, state: &str, event: &str) -> Option<&Transition> {
        self.transitions.get(state).and_then(|events| events.get(event))
    }
}

impl<I> Probe for StateMachine<I> {
    fn probe(&self, context: &mut ProbeContext) {
        let scope = context.create_scope("stateMachine");
        scope.add("name", self.name.as_str());
        scope.add("completedWhenFinalized", self.completed_when_finalized);
        for state in &self.states {
            scope.create_scope("state").add("name", state.name());
        }
        for event in &self.event_names {
            scope.create_scope("event").add("name", &**event);
        }
        for (state, events) in &self.transitions {
            for (event, transition) in events {
                scope
                    .create_scope("transition")
                    .add("state", &**state)
                    .add("event", &**event)
                    .add("activities", transition.activities.clone())
                    .add(
                        "targets",
                        transition
                            .targets
                            .iter()
                            .map(|target| target.to_string())
                            .collect::<Vec<_>>(),
                    );
            }
        }
        for (state, events) in &self.ignored {
            for event in events {
                scope
                    .create_scope("ignore")
                    .add("state", &**state)
                    .add("event", &**event);
            }
        }
    }
}

/// Declares the states, events and transitions of a saga.
///
/// ```ignore
/// let active = State::new("Active");
/// let started = Event::<TestStarted>::new("Started");
///
/// let machine = StateMachineBuilder::<TestInstance>::new("test")
///     .state(&active)
///     .event(&started, Correlation::by_id(|m: &TestStarted| m.correlation_id))
///     .initially(&started, |when| when.transition_to(&active))
///     .build()?;
/// ```
///
/// Declaration errors are recorded and the first one is returned by
/// [`StateMachineBuilder::build`].
pub struct StateMachineBuilder<I> {
    name: String,
    states: Vec<State>,
    events: HashMap<TypeId, Erased>,
    event_names: Vec<Arc<str>>,
    transitions: BTreeMap<Arc<str>, BTreeMap<Arc<str>, Transition>>,
    ignored: BTreeMap<Arc<str>, BTreeSet<Arc<str>>>,
    completed_when_finalized: bool,
    error: Option<BusError>,
    _instance: PhantomData<fn() -> I>,
}

impl<I: SagaInstance> StateMachineBuilder<I> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            events: HashMap::new(),
            event_names: Vec::new(),
            transitions: BTreeMap::new(),
            ignored: BTreeMap::new(),
            completed_when_finalized: false,
            error: None,
            _instance: PhantomData,
        }
    }

    /// Declares `state`. `Initial` and `Final` are implicit and may not be declared.
    #[must_use]
    pub fn state(mut self, state: &State) -> Self {
        if state.name().trim().is_empty() {
            self.reject("state", "name must not be empty".to_string());
        } else if state.is_reserved() {
            self.reject("state", format!("'{}' is reserved", state.name()));
        } else if self.states.contains(state) {
            self.reject("state", format!("'{}' is declared twice", state.name()));
        } else {
            self.states.push(state.clone());
        }
        self
    }

    /// Declares `event`, falling back to the configured missing-instance policy.
    #[must_use]
    pub fn event<M>(self, event: &Event<M>, correlation: Correlation<I, M>) -> Self
    where
        M: BusMessage + Clone,
    {
        self.declare_event(event, correlation, None)
    }

    /// Declares `event` with its own missing-instance policy.
    #[must_use]
    pub fn event_with_policy<M>(
        self,
        event: &Event<M>,
        correlation: Correlation<I, M>,
        missing_instance: MissingInstancePolicy,
    ) -> Self
    where
        M: BusMessage + Clone,
    {
        self.declare_event(event, correlation, Some(missing_instance))
    }

    /// Binds the activities run when `event` creates an instance.
    #[must_use]
    pub fn initially<M, F>(self, event: &Event<M>, configure: F) -> Self
    where
        M: BusMessage + Clone,
        F: FnOnce(EventActivityBinder<I, M>) -> EventActivityBinder<I, M>,
    {
        self.bind(State::initial(), event, configure)
    }

    /// Binds the activities run when `event` arrives in `state`.
    #[must_use]
    pub fn during<M, F>(self, state: &State, event: &Event<M>, configure: F) -> Self
    where
        M: BusMessage + Clone,
        F: FnOnce(EventActivityBinder<I, M>) -> EventActivityBinder<I, M>,
    {
        if state.name() == FINAL {
            return self.rejected("during", "no transition may leave 'Final'".to_string());
        }
        self.bind(state.clone(), event, configure)
    }

    /// Accepts `event` in `state` without doing anything.
    #[must_use]
    pub fn ignore<M>(mut self, state: &State, event: &Event<M>) -> Self
    where
        M: BusMessage + Clone,
    {
        if let Err(error) = self.check_binding(state, event) {
            self.record(error);
            return self;
        }
        let ignored = self.ignored.entry(state.shared_name()).or_default();
        if !ignored.insert(event.shared_name()) {
            self.reject(
                "ignore",
                format!("'{}' is already ignored in '{}'", event.name(), state.name()),
            );
        }
        self
    }

    /// Instances reaching `Final` are deleted instead of saved.
    #[must_use]
    pub fn set_completed_when_finalized(mut self) -> Self {
        self.completed_when_finalized = true;
        self
    }

    /// Validates and freezes the state machine.
    ///
    /// # Errors
    ///
    /// [`BusError::ArgumentInvalid`] for the first declaration error: a
    /// reserved, empty or duplicated state; a duplicated event name or message
    /// type; a binding to an undeclared state or event; a transition target
    /// that was never declared; or a `(state, event)` pair bound twice.
    pub fn build(self) -> Result<Arc<StateMachine<I>>, BusError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.name.trim().is_empty() {
            return Err(BusError::argument("name", "state machine name must not be empty"));
        }
        for transition in self.transitions.values().flat_map(BTreeMap::values) {
            for target in &transition.targets {
                let declared = &**target == FINAL
                    || self.states.iter().any(|state| state.name() == &**target);
                if !declared {
                    return Err(BusError::argument(
                        "transition_to",
                        format!("state '{target}' is not declared"),
                    ));
                }
            }
        }
        for (state, events) in &self.ignored {
            if let Some(event) = events.iter().find(|event| {
                self.transitions
                    .get(state)
                    .is_some_and(|bound| bound.contains_key(*event))
            }) {
                return Err(BusError::argument(
                    "ignore",
                    format!("'{event}' is both handled and ignored in '{state}'"),
                ));
            }
        }

        debug!(
            saga = %self.name,
            states = self.states.len(),
            events = self.event_names.len(),
            "State machine built"
        );
        Ok(Arc::new(StateMachine {
            name: self.name,
            states: self.states,
            events: self.events,
            event_names: self.event_names,
            transitions: self.transitions,
            ignored: self.ignored,
            completed_when_finalized: self.completed_when_finalized,
            _instance: PhantomData,
        }))
    }

    fn declare_event<M>(
        mut self,
        event: &Event<M>,
        correlation: Correlation<I, M>,
        missing_instance: Option<MissingInstancePolicy>,
    ) -> Self
    where
        M: BusMessage + Clone,
    {
        if event.name().trim().is_empty() {
            return self.rejected("event", "name must not be empty".to_string());
        }
        if self.event_names.iter().any(|name| &**name == event.name()) {
            return self.rejected("event", format!("'{}' is declared twice", event.name()));
        }
        if self.events.contains_key(&TypeId::of::<M>()) {
            return self.rejected(
                "event",
                format!(
                    "message type {} already carries another event",
                    std::any::type_name::<M>()
                ),
            );
        }
        let definition = EventDefinition::<I, M> {
            name: event.shared_name(),
            correlation,
            missing_instance,
        };
        self.events.insert(TypeId::of::<M>(), Arc::new(definition));
        self.event_names.push(event.shared_name());
        self
    }

    fn bind<M, F>(mut self, state: State, event: &Event<M>, configure: F) -> Self
    where
        M: BusMessage + Clone,
        F: FnOnce(EventActivityBinder<I, M>) -> EventActivityBinder<I, M>,
    {
        if let Err(error) = self.check_binding(&state, event) {
            self.record(error);
            return self;
        }
        let bound = self.transitions.entry(state.shared_name()).or_default();
        if bound.contains_key(event.name()) {
            return self.rejected(
                "during",
                format!("'{}' is already bound in '{}'", event.name(), state.name()),
            );
        }
        let (activities, targets) = configure(EventActivityBinder::new(event)).into_parts();
        let chain = ActivityChain::<I, M> { activities };
        let transition = Transition {
            activities: chain.names(),
            chain: Arc::new(chain),
            targets,
        };
        bound.insert(event.shared_name(), transition);
        self
    }

    fn check_binding<M>(&self, state: &State, event: &Event<M>) -> Result<(), BusError>
    where
        M: BusMessage + Clone,
    {
        let state_declared = state.name() == INITIAL || self.states.contains(state);
        if !state_declared {
            return Err(BusError::argument(
                "state",
                format!("'{}' is not declared", state.name()),
            ));
        }
        let event_declared = self
            .event_definition_name::<M>()
            .is_some_and(|name| &*name == event.name());
        if !event_declared {
            return Err(BusError::argument(
                "event",
                format!("'{}' is not declared", event.name()),
            ));
        }
        Ok(())
    }

    fn event_definition_name<M>(&self) -> Option<Arc<str>>
    where
        M: BusMessage + Clone,
    {
        self.events
            .get(&TypeId::of::<M>())
            .and_then(|definition| definition.downcast_ref::<EventDefinition<I, M>>())
            .map(|definition| Arc::clone(&definition.name))
    }

    fn rejected(mut self, argument: &'static str, reason: String) -> Self {
        self.reject(argument, reason);
        self
    }

    fn reject(&mut self, argument: &'static str, reason: String) {
        self.record(BusError::argument(argument, reason));
    }

    fn record(&mut self, error: BusError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
