//! Regular expression matching over a Thompson-constructed NFA.
//!
//! Based on Ken Thompson's classic construction (Russ Cox's survey
//! <https://swtch.com/~rsc/regexp/regexp1.html> is the closest
//! reference): every operator of the pattern grammar maps to a small NFA
//! fragment, fragments are combined bottom-up as the pattern is parsed,
//! and the finished automaton is executed by subset simulation, tracking
//! the set of all states the input could currently be in.  Matching
//! therefore needs no backtracking and no prior determinization.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern ──Scanner──> tokens ──Parser──> Nfa ──Simulation──> bool
//! ```
//!
//! The `Scanner` decodes the pattern one code point at a time and
//! classifies each into a [`Token`], with one-token lookahead.  It has
//! no failure mode: the six reserved symbols `( ) * + ? |` are the
//! entire operator vocabulary and any other code point is an ordinary
//! literal.  The `Parser` is a recursive-descent LL(1) parser that
//! never builds a syntax tree: each production directly returns an
//! automaton fragment, assembled by the construction operators as the
//! production reduces.  [`compile`] runs both and hands back a frozen
//! [`Nfa`]; [`Nfa::is_match`] runs the subset simulation against a
//! subject string.
//!
//! Matching is whole-string: the subject must be consumed completely and
//! leave the automaton in an accepting configuration, so the pattern is
//! implicitly anchored at both ends.  There are no character classes,
//! wildcards, capture groups, or explicit anchors.
//!
//! ## States live in an arena
//!
//! `star` and `plus` introduce cycles (their repeat edge points back
//! into the fragment), so the state graph cannot be modeled with owning
//! references.  States live in a flat arena addressed by index;
//! transition and epsilon targets are stored as indices into that arena.
//! The builder owns the arena as a growable vector while parsing and
//! freezes it into an immutable boxed slice when the parse completes,
//! which is what lets a compiled [`Nfa`] be shared freely between
//! threads.
//!
//! ## Epsilon closure is a worklist fixed point
//!
//! Because of the cycles above, the epsilon closure must not be computed
//! by unbounded recursion.  The matcher keeps the active-state list
//! itself as the worklist: a cursor walks the list while newly reached
//! epsilon targets are appended behind it, and a per-state stamp
//! (`lastlist` compared against the current `listid`) gives O(1)
//! membership so every state enters the list at most once per consumed
//! code point.  Termination on cyclic graphs is a correctness
//! requirement here, not an optimization.

use std::fmt;
use std::io::Write;
use std::ops::{Index, IndexMut};
use std::str::Chars;

use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// The error returned when a pattern does not conform to the grammar.
///
/// Parsing stops at the first mismatch.  The error carries the token the
/// parser actually saw and the kind of token the grammar required at
/// that point; there is no recovery and no partial automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxError {
    /// The offending token.
    pub found: Token,
    /// The kind of token the grammar required instead.
    pub expected: TokenKind,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected token: expected {}, found {}",
            self.expected, self.found
        )
    }
}

impl std::error::Error for SyntaxError {}

// ---------------------------------------------------------------------------
// Tokens and scanner
// ---------------------------------------------------------------------------

/// A lexical token of the pattern language.
///
/// Scanning cannot fail: the six reserved symbols map to their operator
/// tokens and every other code point, the metacharacters of richer
/// regex dialects included, becomes a [`Token::Char`] literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// A code point to be matched exactly.
    Char(char),
    /// `*`, zero or more repetitions.
    Star,
    /// `+`, one or more repetitions.
    Plus,
    /// `?`, zero or one occurrence.
    Optional,
    /// `(`, opens a group.
    LParen,
    /// `)`, closes a group.
    RParen,
    /// `|`, alternation.
    Or,
    /// The pattern is exhausted.  Returned indefinitely once reached.
    Eof,
}

/// The kind of a [`Token`], without the literal payload.  Names the
/// "expected" side of a [`SyntaxError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Char,
    Star,
    Plus,
    Optional,
    LParen,
    RParen,
    Or,
    Eof,
}

impl Token {
    /// The kind of this token.
    #[inline]
    pub fn kind(self) -> TokenKind {
        match self {
            Token::Char(_) => TokenKind::Char,
            Token::Star => TokenKind::Star,
            Token::Plus => TokenKind::Plus,
            Token::Optional => TokenKind::Optional,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Or => TokenKind::Or,
            Token::Eof => TokenKind::Eof,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Char(c) => write!(f, "literal `{c}`"),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Char => "literal",
            TokenKind::Star => "`*`",
            TokenKind::Plus => "`+`",
            TokenKind::Optional => "`?`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Or => "`|`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(name)
    }
}

/// Splits a pattern into [`Token`]s, one decoded code point per token,
/// with one-token lookahead.
#[derive(Debug)]
struct Scanner<'a> {
    chars: Chars<'a>,
    /// One-token pushback buffer backing [`peek`](Self::peek).
    buf: Option<Token>,
}

impl<'a> Scanner<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            chars: pattern.chars(),
            buf: None,
        }
    }

    /// Remove and return the next token.  Once the pattern is exhausted
    /// this returns [`Token::Eof`] on every further call.
    fn next(&mut self) -> Token {
        match self.buf.take() {
            Some(token) => token,
            None => self.scan(),
        }
    }

    /// Return the next token without consuming it.  Repeated peeks see
    /// the same token, and the following [`next`](Self::next) yields it.
    fn peek(&mut self) -> Token {
        let token = self.next();
        self.buf = Some(token);
        token
    }

    /// Classify one code point.  Exact match against the six reserved
    /// symbols; anything else is a literal.
    fn scan(&mut self) -> Token {
        match self.chars.next() {
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some('*') => Token::Star,
            Some('+') => Token::Plus,
            Some('?') => Token::Optional,
            Some('|') => Token::Or,
            Some(c) => Token::Char(c),
            None => Token::Eof,
        }
    }
}

// ---------------------------------------------------------------------------
// NFA states
// ---------------------------------------------------------------------------

/// A single NFA state.
///
/// States are created by the construction operators and never deleted.
/// Combinators may append further edges to an existing state, but the
/// only field ever overwritten after creation is `accepting`, cleared
/// when the fragment owning the state is absorbed into a larger one.
#[derive(Debug, Default)]
struct State {
    /// Exact-match transitions: for each labeled code point, the states
    /// reachable by consuming it.  Insertion-ordered so that dumps of
    /// the automaton are reproducible.
    transitions: IndexMap<char, Vec<StateIdx>>,
    /// States reachable without consuming input.
    epsilon: Vec<StateIdx>,
    /// Whether this state is currently a designated accept state.
    accepting: bool,
}

/// Index into the NFA state arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct StateIdx(u32);

impl StateIdx {
    /// Return the raw index as `usize`.
    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed arena access: `states[state_idx]`.
impl Index<StateIdx> for [State] {
    type Output = State;

    #[inline]
    fn index(&self, idx: StateIdx) -> &State {
        &self[idx.idx()]
    }
}

impl IndexMut<StateIdx> for [State] {
    #[inline]
    fn index_mut(&mut self, idx: StateIdx) -> &mut State {
        &mut self[idx.idx()]
    }
}

// ---------------------------------------------------------------------------
// Compiled NFA
// ---------------------------------------------------------------------------

struct StateList(Box<[State]>);

impl fmt::Debug for StateList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.0.iter().enumerate()).finish()
    }
}

impl std::ops::Deref for StateList {
    type Target = [State];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled NFA ready for matching.
///
/// The state arena is frozen once parsing succeeds; matching reads it
/// and never writes, so one automaton can serve any number of subjects,
/// concurrently when shared by reference.
#[derive(Debug)]
pub struct Nfa {
    states: StateList,
    start: StateIdx,
    accept: StateIdx,
}

impl Nfa {
    /// Number of states in the automaton.
    ///
    /// Every pattern operator contributes a bounded number of states, so
    /// this grows linearly with the pattern length.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Emit a Graphviz DOT representation of the NFA.
    ///
    /// The start state is drawn as a box, the accept state with a double
    /// border; consuming edges are labeled with their code point and
    /// free edges with `ε`.
    pub fn to_dot(&self, mut buffer: impl Write) {
        let mut visited = vec![false; self.states.len()];
        writeln!(buffer, "digraph graphname {{").unwrap();
        writeln!(buffer, "\trankdir=LR;").unwrap();
        writeln!(buffer, "\t{} [shape=box];", self.start).unwrap();
        writeln!(buffer, "\t{} [peripheries=2];", self.accept).unwrap();
        let mut stack = vec![self.start];
        while let Some(s) = stack.pop() {
            if visited[s.idx()] {
                continue;
            }
            visited[s.idx()] = true;
            let state = &self.states[s];
            writeln!(buffer, "\t// [{}] {:?}", s, state).unwrap();
            for (&on, targets) in &state.transitions {
                for &target in targets {
                    stack.push(target);
                    writeln!(buffer, "\t{} -> {} [label=\"{}\"];", s, target, on).unwrap();
                }
            }
            for &target in &state.epsilon {
                stack.push(target);
                writeln!(buffer, "\t{} -> {} [label=\"ε\"];", s, target).unwrap();
            }
        }
        writeln!(buffer, "}}").unwrap();
    }
}

// ---------------------------------------------------------------------------
// NFA fragments and construction operators
// ---------------------------------------------------------------------------

/// A completed sub-automaton: its entry state and its single designated
/// accept state.
///
/// Move-only: combining a fragment consumes it, so an absorbed fragment
/// cannot be combined a second time.
#[derive(Debug)]
struct Fragment {
    start: StateIdx,
    accept: StateIdx,
}

/// Owns the growing state arena for the duration of one parse and
/// provides the construction operators of Thompson's construction.
///
/// Every operator allocates only new states and edges; none rewires or
/// removes anything already built.  The single mutation applied to an
/// existing state is the accept-flag clear performed when a fragment is
/// absorbed, one explicit write per absorbed fragment.
#[derive(Debug, Default)]
struct NfaBuilder {
    states: Vec<State>,
}

impl NfaBuilder {
    /// Push a new state and return its index.
    fn state(&mut self, accepting: bool) -> StateIdx {
        let idx = StateIdx(self.states.len() as u32);
        self.states.push(State {
            accepting,
            ..State::default()
        });
        idx
    }

    /// Add a transition consuming `on` from `from` to `to`.
    fn add_transition(&mut self, from: StateIdx, on: char, to: StateIdx) {
        self.states.as_mut_slice()[from]
            .transitions
            .entry(on)
            .or_default()
            .push(to);
    }

    /// Add a free transition from `from` to `to`.
    fn add_epsilon(&mut self, from: StateIdx, to: StateIdx) {
        self.states.as_mut_slice()[from].epsilon.push(to);
    }

    /// Clear the accept flag of a fragment's accept state as it is
    /// absorbed into a larger construction.
    fn retire_accept(&mut self, accept: StateIdx) {
        self.states.as_mut_slice()[accept].accepting = false;
    }

    /// A two-state fragment: `start --c--> accept`.
    fn literal(&mut self, c: char) -> Fragment {
        let start = self.state(false);
        let accept = self.state(true);
        self.add_transition(start, c, accept);
        Fragment { start, accept }
    }

    /// `AB`: A's accept state retires and bridges to B's start.  No new
    /// states; the result spans A's start to B's accept.
    fn concat(&mut self, left: Fragment, right: Fragment) -> Fragment {
        self.retire_accept(left.accept);
        self.add_epsilon(left.accept, right.start);
        Fragment {
            start: left.start,
            accept: right.accept,
        }
    }

    /// `A|B`: a new start forks to both branches; both accepts retire
    /// and funnel into a new shared accept.
    fn union(&mut self, left: Fragment, right: Fragment) -> Fragment {
        let start = self.state(false);
        self.add_epsilon(start, left.start);
        self.add_epsilon(start, right.start);

        let accept = self.state(true);
        self.retire_accept(left.accept);
        self.retire_accept(right.accept);
        self.add_epsilon(left.accept, accept);
        self.add_epsilon(right.accept, accept);

        Fragment { start, accept }
    }

    /// `A*`: the new start may bypass A entirely (zero repetitions), and
    /// A's retired accept loops back to A's start for another round or
    /// exits forward.  The loop-back edge is what makes the state graph
    /// cyclic.
    fn star(&mut self, inner: Fragment) -> Fragment {
        let start = self.state(false);
        let accept = self.state(true);

        self.add_epsilon(start, inner.start);
        self.add_epsilon(start, accept);

        self.retire_accept(inner.accept);
        self.add_epsilon(inner.accept, inner.start);
        self.add_epsilon(inner.accept, accept);

        Fragment { start, accept }
    }

    /// `A+`: [`star`](Self::star) without the bypass edge, so at least
    /// one traversal of A is forced.
    fn plus(&mut self, inner: Fragment) -> Fragment {
        let start = self.state(false);
        let accept = self.state(true);

        self.add_epsilon(start, inner.start);

        self.retire_accept(inner.accept);
        self.add_epsilon(inner.accept, inner.start);
        self.add_epsilon(inner.accept, accept);

        Fragment { start, accept }
    }

    /// `A?`: [`star`](Self::star) without the loop-back edge, so A runs
    /// at most once.
    fn optional(&mut self, inner: Fragment) -> Fragment {
        let start = self.state(false);
        let accept = self.state(true);

        self.add_epsilon(start, inner.start);
        self.add_epsilon(start, accept);

        self.retire_accept(inner.accept);
        self.add_epsilon(inner.accept, accept);

        Fragment { start, accept }
    }

    /// Freeze the arena around the finished fragment.
    fn finish(self, fragment: Fragment) -> Nfa {
        Nfa {
            states: StateList(self.states.into_boxed_slice()),
            start: fragment.start,
            accept: fragment.accept,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive-descent parser driving the construction operators.
///
/// Grammar, with one-token lookahead and no backtracking:
///
/// ```text
/// expr    := term ( '|' term )*
/// term    := factor+
/// factor  := primary ( '*' | '+' | '?' )?
/// primary := literal | '(' expr ')'
/// ```
///
/// Each production returns the fragment it built.  Note that `term`
/// requires at least one `factor`: an empty pattern, a bare `|`
/// alternative, and an empty group `()` are all rejected by that one
/// rule, with no dedicated checks.  Likewise `factor` accepts at most
/// one postfix operator, so the second `*` of `a**` is left unconsumed
/// and trips the mandatory end-of-input check in [`parse`](Self::parse).
#[derive(Debug)]
struct Parser<'a> {
    scanner: Scanner<'a>,
    nfa: NfaBuilder,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            scanner: Scanner::new(pattern),
            nfa: NfaBuilder::default(),
        }
    }

    /// Consume the next token, which must be of the `expected` kind.
    fn expect(&mut self, expected: TokenKind) -> Result<(), SyntaxError> {
        let found = self.scanner.next();
        if found.kind() == expected {
            Ok(())
        } else {
            Err(SyntaxError { found, expected })
        }
    }

    /// True when the next token is of the `expected` kind.  Consumes
    /// nothing.
    fn check(&mut self, expected: TokenKind) -> bool {
        self.scanner.peek().kind() == expected
    }

    /// Parse one full pattern and freeze the automaton.
    fn parse(mut self) -> Result<Nfa, SyntaxError> {
        let fragment = self.expr()?;
        self.expect(TokenKind::Eof)?;
        Ok(self.nfa.finish(fragment))
    }

    /// `expr := term ( '|' term )*`, folded left-to-right through
    /// [`NfaBuilder::union`].
    fn expr(&mut self) -> Result<Fragment, SyntaxError> {
        let mut fragment = self.term()?;
        while self.check(TokenKind::Or) {
            self.scanner.next();
            let right = self.term()?;
            fragment = self.nfa.union(fragment, right);
        }
        Ok(fragment)
    }

    /// `term := factor+`, folded left-to-right through
    /// [`NfaBuilder::concat`].
    fn term(&mut self) -> Result<Fragment, SyntaxError> {
        let mut fragment = self.factor()?;
        while self.check(TokenKind::Char) || self.check(TokenKind::LParen) {
            let right = self.factor()?;
            fragment = self.nfa.concat(fragment, right);
        }
        Ok(fragment)
    }

    /// `factor := primary ( '*' | '+' | '?' )?`
    fn factor(&mut self) -> Result<Fragment, SyntaxError> {
        let mut fragment = self.primary()?;
        if self.check(TokenKind::Star) {
            self.scanner.next();
            fragment = self.nfa.star(fragment);
        } else if self.check(TokenKind::Plus) {
            self.scanner.next();
            fragment = self.nfa.plus(fragment);
        } else if self.check(TokenKind::Optional) {
            self.scanner.next();
            fragment = self.nfa.optional(fragment);
        }
        Ok(fragment)
    }

    /// `primary := literal | '(' expr ')'`
    fn primary(&mut self) -> Result<Fragment, SyntaxError> {
        if self.check(TokenKind::LParen) {
            self.scanner.next();
            let group = self.expr()?;
            self.expect(TokenKind::RParen)?;
            Ok(group)
        } else if let Token::Char(c) = self.scanner.peek() {
            self.scanner.next();
            Ok(self.nfa.literal(c))
        } else {
            Err(SyntaxError {
                found: self.scanner.next(),
                expected: TokenKind::Char,
            })
        }
    }
}

/// Compile `pattern` into a ready-to-match [`Nfa`].
///
/// Scans and parses the whole pattern, building the automaton bottom-up
/// as productions reduce.  Returns the first [`SyntaxError`] encountered
/// otherwise; there is no partial result.
pub fn compile(pattern: &str) -> Result<Nfa, SyntaxError> {
    Parser::new(pattern).parse()
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Scratch state for one subset-simulation run.
#[derive(Debug)]
struct Simulation<'a> {
    states: &'a [State],
    /// Per-state: the `listid` of the round in which the state last
    /// entered a list.  O(1) membership tests with no clearing between
    /// rounds.
    lastlist: Vec<usize>,
    /// Monotonically increasing round id; one round per consumed code
    /// point, plus one for the start closure.
    listid: usize,
    /// States active after the last consumed code point, always already
    /// epsilon-closed.
    clist: Vec<StateIdx>,
    /// The list under construction for the next position; doubles as
    /// the closure worklist.  Swapped with `clist` each round, never
    /// reallocated.
    nlist: Vec<StateIdx>,
}

impl<'a> Simulation<'a> {
    fn new(states: &'a [State]) -> Self {
        Self {
            states,
            lastlist: vec![usize::MAX; states.len()],
            listid: 0,
            clist: Vec::new(),
            nlist: Vec::new(),
        }
    }

    /// Append `idx` to `nlist` unless it already entered a list this
    /// round.
    #[inline]
    fn add(&mut self, idx: StateIdx) {
        if self.lastlist[idx.idx()] != self.listid {
            self.lastlist[idx.idx()] = self.listid;
            self.nlist.push(idx);
        }
    }

    /// Expand `nlist` to its epsilon closure, in place.
    ///
    /// The list doubles as the worklist: a cursor walks it while
    /// [`add`](Self::add) appends epsilon targets not yet seen this
    /// round behind it.  Each state is processed at most once, so the
    /// fixed point is reached even on the cyclic graphs built by `star`
    /// and `plus`.
    fn close(&mut self) {
        let states = self.states;
        let mut cursor = 0;
        while cursor < self.nlist.len() {
            let idx = self.nlist[cursor];
            cursor += 1;
            for &target in &states[idx].epsilon {
                self.add(target);
            }
        }
    }

    /// Compute the initial active list: the epsilon closure of
    /// `{start}`.
    fn startlist(&mut self, start: StateIdx) {
        self.add(start);
        self.close();
        std::mem::swap(&mut self.clist, &mut self.nlist);
        self.listid += 1;
    }

    /// Advance the simulation by one input code point.
    ///
    /// The next list receives every state reachable from the current
    /// list by an exact-match transition on `ch`, gets epsilon-closed,
    /// and becomes the current list; the two list buffers swap roles.
    fn step(&mut self, ch: char) {
        self.nlist.clear();
        let clist = std::mem::take(&mut self.clist);
        let states = self.states;
        for &idx in &clist {
            if let Some(targets) = states[idx].transitions.get(&ch) {
                for &target in targets {
                    self.add(target);
                }
            }
        }
        self.close();
        self.clist = std::mem::replace(&mut self.nlist, clist);
        self.listid += 1;
    }

    /// True when any active state is accepting.
    fn accepting(&self) -> bool {
        self.clist.iter().any(|&idx| self.states[idx].accepting)
    }
}

impl Nfa {
    /// Match `subject` against the automaton, whole string.
    ///
    /// The verdict is `true` exactly when consuming every code point of
    /// `subject` in order can leave the automaton in an accepting state.
    /// Matching allocates only its own scratch lists and never touches
    /// the automaton, so `&Nfa` can be matched from many threads at
    /// once.
    pub fn is_match(&self, subject: &str) -> bool {
        let mut simulation = Simulation::new(&self.states);
        simulation.startlist(self.start);
        for ch in subject.chars() {
            // A dead configuration cannot be revived by further input.
            if simulation.clist.is_empty() {
                return false;
            }
            simulation.step(ch);
        }
        simulation.accepting()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
