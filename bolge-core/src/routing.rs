// Route table: ordered named routes, URL matching and URL generation

use crate::http::value_to_string;
use crate::{CONTROLLER_ATTRIBUTE, Error, HttpRequest, ROUTE_ATTRIBUTE};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::logging::trace;

/// Routing output: defaults of the matched route overlaid with the
/// placeholder values taken from the path, plus `_route`.
pub type Attributes = HashMap<String, Value>;

/// A single route definition
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    path: String,
    defaults: BTreeMap<String, Value>,
    requirements: BTreeMap<String, String>,
    methods: Vec<String>,
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };

        Self {
            path,
            defaults: BTreeMap::new(),
            requirements: BTreeMap::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn with_defaults<I, K>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.defaults
            .extend(defaults.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Shorthand for the `_controller` default
    pub fn with_controller(self, controller: impl Into<String>) -> Self {
        let controller: String = controller.into();
        self.with_default(CONTROLLER_ATTRIBUTE, controller)
    }

    /// Constrain a placeholder with a regular expression. Anchors are implied.
    pub fn with_requirement(mut self, key: impl Into<String>, regex: impl Into<String>) -> Self {
        let regex: String = regex.into();
        let regex = regex.strip_prefix('^').unwrap_or(&regex);
        let regex = regex.strip_suffix('$').unwrap_or(regex);
        self.requirements.insert(key.into(), regex.to_string());
        self
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = methods
            .into_iter()
            .map(|m| m.as_ref().to_uppercase())
            .collect();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    pub fn default(&self, key: &str) -> Option<&Value> {
        self.defaults.get(key)
    }

    pub fn requirements(&self) -> &BTreeMap<String, String> {
        &self.requirements
    }

    /// Allowed methods; empty means any
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn controller(&self) -> Option<&str> {
        self.defaults.get(CONTROLLER_ATTRIBUTE).and_then(Value::as_str)
    }

    fn allows(&self, method: &str) -> bool {
        self.methods.is_empty()
            || self.methods.iter().any(|m| m == method)
            || (method == "HEAD" && self.methods.iter().any(|m| m == "GET"))
    }

    fn with_path_prefix(&self, prefix: &str) -> Route {
        let prefix = prefix.trim_end_matches('/');
        let path = match (prefix.is_empty(), self.path.as_str()) {
            (true, _) => self.path.clone(),
            (false, "/") => prefix.to_string(),
            (false, path) => format!("{}{}", prefix, path),
        };

        Route {
            path: if path.starts_with('/') { path } else { format!("/{}", path) },
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    Text(String),
    Variable {
        separator: String,
        name: String,
        requirement: String,
    },
}

/// Regex form of a route, built once when the route enters a table
#[derive(Debug, Clone)]
struct CompiledRoute {
    regex: Regex,
    tokens: Vec<Token>,
    variables: Vec<String>,
    checks: HashMap<String, Regex>,
}

impl CompiledRoute {
    fn compile(route: &Route) -> Result<Self, Error> {
        let invalid = |msg: String| Error::InvalidRoute(format!("{} in \"{}\"", msg, route.path));

        let mut tokens = Vec::new();
        let mut variables: Vec<String> = Vec::new();
        let mut rest = route.path.as_str();

        while let Some(start) = rest.find('{') {
            let end = rest[start..]
                .find('}')
                .map(|offset| start + offset)
                .ok_or_else(|| invalid("Unclosed placeholder".to_string()))?;

            let name = &rest[start + 1..end];
            if !is_valid_variable_name(name) {
                return Err(invalid(format!("Invalid placeholder name \"{}\"", name)));
            }
            if variables.iter().any(|v| v == name) {
                return Err(invalid(format!("Placeholder \"{}\" used twice", name)));
            }

            let mut text = rest[..start].to_string();
            let separator = if text.ends_with('/') {
                text.pop();
                "/".to_string()
            } else {
                String::new()
            };
            if !text.is_empty() {
                tokens.push(Token::Text(text));
            }

            let requirement = route
                .requirements
                .get(name)
                .cloned()
                .unwrap_or_else(|| default_requirement(&rest[end + 1..]));

            tokens.push(Token::Variable {
                separator,
                name: name.to_string(),
                requirement,
            });
            variables.push(name.to_string());
            rest = &rest[end + 1..];
        }

        if !rest.is_empty() {
            tokens.push(Token::Text(rest.to_string()));
        }

        let mut checks = HashMap::new();
        for token in &tokens {
            if let Token::Variable {
                name, requirement, ..
            } = token
            {
                let check = Regex::new(&format!("^(?:{})$", requirement)).map_err(|e| {
                    invalid(format!("Invalid requirement for \"{}\": {}", name, e))
                })?;
                checks.insert(name.clone(), check);
            }
        }

        // Trailing placeholders that have a default may be left out of the path
        let mut first_optional = tokens.len();
        for (i, token) in tokens.iter().enumerate().rev() {
            match token {
                Token::Variable { name, .. } if route.defaults.contains_key(name) => {
                    first_optional = i
                }
                _ => break,
            }
        }

        let mut pattern = String::from("^");
        for token in &tokens[..first_optional] {
            pattern.push_str(&token_pattern(token));
        }
        let mut tail = String::new();
        for token in tokens[first_optional..].iter().rev() {
            tail = format!("(?:{}{})?", token_pattern(token), tail);
        }
        pattern.push_str(&tail);
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            regex,
            tokens,
            variables,
            checks,
        })
    }

    fn matches(&self, route: &Route, path: &str) -> Option<Attributes> {
        let captures = self.regex.captures(path).or_else(|| {
            // A route made only of optional placeholders matches the root
            if path == "/" {
                self.regex.captures("")
            } else {
                None
            }
        })?;

        let mut attributes: Attributes = route
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for name in &self.variables {
            if let Some(m) = captures.name(name) {
                let value = urlencoding::decode(m.as_str())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_string());
                attributes.insert(name.clone(), Value::String(value));
            }
        }

        Some(attributes)
    }
}

fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Anything up to the next slash, or up to the character that follows the
/// placeholder when that is not a slash.
fn default_requirement(following: &str) -> String {
    match following.chars().next() {
        Some(c) if c != '/' && c != '{' => {
            format!("[^/{}]+", regex::escape(&c.to_string()))
        }
        _ => "[^/]+".to_string(),
    }
}

fn token_pattern(token: &Token) -> String {
    match token {
        Token::Text(text) => regex::escape(text),
        Token::Variable {
            separator,
            name,
            requirement,
        } => format!("{}(?P<{}>{})", regex::escape(separator), name, requirement),
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    name: String,
    route: Route,
    compiled: CompiledRoute,
}

/// Ordered collection of named routes. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Re-adding a name replaces the old route and moves it to the end.
    pub fn add(&mut self, name: impl Into<String>, route: Route) -> Result<(), Error> {
        let name = name.into();
        let compiled = CompiledRoute::compile(&route)?;

        if self.index.contains_key(&name) {
            self.entries.retain(|entry| entry.name != name);
        }
        self.entries.push(RouteEntry {
            name,
            route,
            compiled,
        });
        self.reindex();
        Ok(())
    }

    /// Append every route of `other`, optionally under a path prefix.
    pub fn add_collection(&mut self, other: RouteTable, prefix: Option<&str>) -> Result<(), Error> {
        for entry in other.entries {
            let route = match prefix {
                Some(prefix) => entry.route.with_path_prefix(prefix),
                None => entry.route,
            };
            self.add(entry.name, route)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.entry(name).map(|entry| &entry.route)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), &entry.route))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Match a path against the table.
    ///
    /// Fails with `RouteNotFound` when no path matches and with
    /// `MethodNotAllowed` when a path matches only under other methods.
    pub fn match_path(&self, path: &str, context: &RequestContext) -> Result<Attributes, Error> {
        let mut allowed: Vec<&str> = Vec::new();

        for entry in &self.entries {
            let Some(mut attributes) = entry.compiled.matches(&entry.route, path) else {
                continue;
            };

            if !entry.route.allows(&context.method) {
                for method in &entry.route.methods {
                    if !allowed.contains(&method.as_str()) {
                        allowed.push(method);
                    }
                }
                continue;
            }

            trace!(route = %entry.name, path = path, "Route matched");
            attributes.insert(ROUTE_ATTRIBUTE.to_string(), Value::String(entry.name.clone()));
            return Ok(attributes);
        }

        if allowed.is_empty() {
            Err(Error::RouteNotFound(path.to_string()))
        } else {
            Err(Error::MethodNotAllowed(format!(
                "{} {} (allow: {})",
                context.method,
                path,
                allowed.join(", ")
            )))
        }
    }

    /// Generate the path of a named route.
    ///
    /// Placeholders take their value from `params`, falling back to the route
    /// defaults. Parameters that are not placeholders (and differ from the
    /// route defaults) end up in the query string.
    pub fn generate(&self, name: &str, params: &HashMap<String, String>) -> Result<String, Error> {
        let entry = self
            .entry(name)
            .ok_or_else(|| Error::RouteNotFound(name.to_string()))?;

        let mut url = String::new();
        let mut missing = Vec::new();

        for token in &entry.compiled.tokens {
            match token {
                Token::Text(text) => url.push_str(text),
                Token::Variable {
                    separator,
                    name: variable,
                    requirement,
                } => {
                    let value = params
                        .get(variable)
                        .cloned()
                        .or_else(|| entry.route.defaults.get(variable).map(value_to_string));

                    let Some(value) = value else {
                        missing.push(variable.as_str());
                        continue;
                    };

                    let valid = entry
                        .compiled
                        .checks
                        .get(variable)
                        .is_some_and(|check| check.is_match(&value));
                    if !valid {
                        return Err(Error::InvalidParameter(format!(
                            "parameter \"{}\" for route \"{}\" must match \"{}\" (\"{}\" given)",
                            variable, name, requirement, value
                        )));
                    }

                    url.push_str(separator);
                    url.push_str(&urlencoding::encode(&value));
                }
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingParameters(format!(
                "\"{}\" required to generate a URL for route \"{}\"",
                missing.join("\", \""),
                name
            )));
        }

        if url.is_empty() {
            url.push('/');
        }

        let mut extra: Vec<(&String, &String)> = params
            .iter()
            .filter(|(key, value)| {
                !entry.compiled.variables.contains(*key)
                    && entry.route.defaults.get(*key).map(value_to_string).as_ref() != Some(*value)
            })
            .collect();

        if !extra.is_empty() {
            extra.sort();
            let query: Vec<String> = extra
                .into_iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }

        Ok(url)
    }

    fn entry(&self, name: &str) -> Option<&RouteEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.name.clone(), i))
            .collect();
    }
}

/// Information about the current request used while matching
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub base_url: String,
    pub method: String,
    pub host: String,
    pub scheme: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this context updated from an incoming request
    pub fn for_request(&self, request: &HttpRequest) -> Self {
        let mut context = self.clone();
        context.method = request.method.to_uppercase();
        if let Some(host) = request.header("host") {
            context.host = host.to_string();
        }
        context
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            method: "GET".to_string(),
            host: "localhost".to_string(),
            scheme: "http".to_string(),
        }
    }
}

/// Matches requests against a shared route table
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    routes: Arc<RouteTable>,
    context: RequestContext,
}

impl UrlMatcher {
    pub fn new(routes: Arc<RouteTable>, context: RequestContext) -> Self {
        Self { routes, context }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn match_request(&self, request: &HttpRequest) -> Result<Attributes, Error> {
        let context = self.context.for_request(request);
        let path = if context.base_url.is_empty() {
            request.path.as_str()
        } else {
            request
                .path
                .strip_prefix(context.base_url.as_str())
                .ok_or_else(|| Error::RouteNotFound(request.path.clone()))?
        };
        let path = if path.is_empty() { "/" } else { path };

        self.routes.match_path(path, &context)
    }
}
