//! In-process fakes for the model service and tool providers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, ResponseBlock, ToolSpec, ToolUse,
    Usage,
};
use crate::tools::{Connector, ProviderConfig, ProviderError, ProviderSession, ToolError};

pub fn spec(name: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: format!("{name} tool"),
        input_schema: json!({"type": "object"}),
    }
}

pub fn tool_use(id: &str, name: &str, arguments: Value) -> ToolUse {
    let arguments = match arguments {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

pub fn provider(name: &str) -> ProviderConfig {
    ProviderConfig::new(mcp::ServerConfig {
        name: name.to_string(),
        command: format!("{name}-server"),
        ..Default::default()
    })
}

/// A backend that replays canned responses and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Vec<ResponseBlock>, ModelError>>>,
    requests: Mutex<Vec<(Vec<Message>, Vec<String>)>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Vec<ResponseBlock>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::default(),
        }
    }

    pub fn then_fail(self, error: ModelError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// The history sent on each call.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        let requests = self.requests.lock().unwrap();
        requests.iter().map(|(messages, _)| messages.clone()).collect()
    }

    /// The tool names offered on each call.
    pub fn catalogs(&self) -> Vec<Vec<String>> {
        let requests = self.requests.lock().unwrap();
        requests.iter().map(|(_, tools)| tools.clone()).collect()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push((
            request.messages.to_vec(),
            request.tools.iter().map(|t| t.name.clone()).collect(),
        ));
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("script exhausted".into())));
        next.map(|blocks| ModelResponse {
            blocks,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}

/// Behaviour of one fake provider.
#[derive(Clone, Default)]
pub struct FakeProvider {
    pub tools: Vec<ToolSpec>,
    pub fail_connect: bool,
    pub fail_discover: bool,
    /// Invocations sleep this long before answering.
    pub delay: Option<Duration>,
}

impl FakeProvider {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|n| spec(n)).collect(),
            ..Default::default()
        }
    }
}

/// Hands out [`FakeSession`]s and records lifecycle events, in order, as
/// `"connect <name>"` / `"shutdown <name>"`.
#[derive(Clone, Default)]
pub struct FakeConnector {
    providers: HashMap<String, FakeProvider>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn with(mut self, name: &str, provider: FakeProvider) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, config: &ProviderConfig) -> Result<FakeSession, ProviderError> {
        let name = config.name().to_string();
        let behaviour = self
            .providers
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::Spawn(format!("no such command: {name}")))?;
        if behaviour.fail_connect {
            return Err(ProviderError::Handshake("connection refused".into()));
        }
        self.events.lock().unwrap().push(format!("connect {name}"));
        Ok(FakeSession {
            name,
            behaviour,
            events: Arc::clone(&self.events),
        })
    }
}

/// Answers `"<provider>:<tool>"`; a tool named `broken` fails.
pub struct FakeSession {
    name: String,
    behaviour: FakeProvider,
    events: Arc<Mutex<Vec<String>>>,
}

impl ProviderSession for FakeSession {
    async fn discover(&self) -> Result<Vec<ToolSpec>, ProviderError> {
        if self.behaviour.fail_discover {
            return Err(ProviderError::Discovery("tools/list failed".into()));
        }
        Ok(self.behaviour.tools.clone())
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<String, ToolError> {
        if let Some(delay) = self.behaviour.delay {
            tokio::time::sleep(delay).await;
        }
        if name == "broken" {
            return Err(ToolError::Application("it broke".into()));
        }
        if arguments.is_empty() {
            Ok(format!("{}:{name}", self.name))
        } else {
            Ok(format!("{}:{name}:{}", self.name, Value::Object(arguments)))
        }
    }

    async fn shutdown(self) {
        self.events
            .lock()
            .unwrap()
            .push(format!("shutdown {}", self.name));
    }
}
