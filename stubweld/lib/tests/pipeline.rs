use std::fs;
use std::path::Path;

use stubweld_lib::{ManagerRegistry, Pipeline, PipelineConfig};

const CONTROLLER_STUB: &str = "\
import typing
from nexosapi.api.controller import NexosAIAPIEndpointController
from nexosapi.domain.requests import ChatCompletionsRequest
from nexosapi.domain.responses import ChatCompletionsResponse

class ChatCompletionsEndpointController(NexosAIAPIEndpointController[ChatCompletionsRequest, ChatCompletionsResponse]):
    endpoint: typing.ClassVar[str]
    request_model = ChatCompletionsRequest
    response_model = ChatCompletionsResponse
    class Operations:
        @staticmethod
        def with_model(request, model: str) -> ChatCompletionsRequest:
            \"\"\"
            Attach a model name to the pending request.

            :param request: The pending request data.
            :param model: The model identifier.
            \"\"\"
";

const REQUESTS_STUB: &str = "\
import typing

class ChatMessage(BaseModel):
    role: str
    content: str | None

class ChatCompletionsRequest(NexosAPIRequest):
    model: str
    messages: list[ChatMessage]
    temperature: float | None = ...
";

fn seed_workspace(root: &Path) -> PipelineConfig {
    fs::create_dir_all(root.join("src/nexosapi/domain")).unwrap();
    fs::write(root.join("src/nexosapi/domain/requests.py"), "").unwrap();
    fs::write(root.join("src/stale.pyi"), "x: int\n").unwrap();
    fs::create_dir_all(root.join("tests")).unwrap();

    let scratch = root.join("stubs");
    fs::create_dir_all(scratch.join("nexosapi/api/endpoints")).unwrap();
    fs::create_dir_all(scratch.join("nexosapi/domain")).unwrap();
    fs::create_dir_all(scratch.join("nexosapi/config")).unwrap();
    fs::write(
        scratch.join("nexosapi/api/endpoints/completions.pyi"),
        CONTROLLER_STUB,
    )
    .unwrap();
    fs::write(scratch.join("nexosapi/api/endpoints/__init__.pyi"), "").unwrap();
    fs::write(scratch.join("nexosapi/domain/requests.pyi"), REQUESTS_STUB).unwrap();
    fs::write(scratch.join("nexosapi/domain/base.pyi"), "class NullableBaseModel: ...\n").unwrap();
    fs::write(scratch.join("nexosapi/config/settings.pyi"), "DEBUG: bool\n").unwrap();
    fs::create_dir_all(scratch.join("tests")).unwrap();
    fs::write(
        scratch.join("tests/mocks.pyi"),
        "class MockChatRequest(NexosAPIRequest):\n    prompt: str\n",
    )
    .unwrap();

    PipelineConfig {
        source_dir: root.join("src"),
        test_dir: root.join("tests"),
        scratch_dir: scratch,
        ..PipelineConfig::default()
    }
}

#[test]
fn full_batch_rewrites_and_relocates_stubs() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_workspace(dir.path());
    let scratch = config.scratch_dir.clone();

    Pipeline::new(config, ManagerRegistry::default())
        .run()
        .unwrap();

    // Scratch is gone, stale stubs are gone, pruned stubs never land in src.
    assert!(!scratch.exists());
    assert!(!dir.path().join("src/stale.pyi").exists());
    assert!(!dir.path().join("src/nexosapi/config/settings.pyi").exists());
    assert!(!dir.path().join("src/nexosapi/domain/base.pyi").exists());

    // The explicitly-listed package stub survives pruning.
    assert!(dir.path().join("src/nexosapi/api/endpoints/__init__.pyi").exists());

    let controller = fs::read_to_string(
        dir.path().join("src/nexosapi/api/endpoints/completions.pyi"),
    )
    .unwrap();
    assert!(controller.starts_with("from __future__ import annotations\n"));
    assert!(!controller.contains("class Operations"));
    assert!(controller.contains(
        "class RequestManager(ChatCompletionsEndpointController._RequestManager):"
    ));
    assert!(controller.contains(
        "def with_model(model: str) -> ChatCompletionsEndpointController.RequestManager:"
    ));
    assert!(!controller.contains(":param request:"));
    assert!(controller.contains("request: ChatCompletionsEndpointController.RequestManager\n"));
    // The registry markers resolved to the bound records, parameter and
    // return positions alike, with the import for the resolvable module.
    assert!(controller.contains("def prepare(self, data: ChatCompletionsRequestData)"));
    assert!(controller.contains("from nexosapi.domain.requests import ChatCompletionsRequestData\n"));
    assert!(controller.contains("async def send(self) -> ChatCompletionsResponseData:"));
    assert!(controller.contains("def dump(self) -> ChatCompletionsRequestData:"));
    // Static registry methods stay static, without a `self` parameter.
    assert!(controller.contains("def get_verb_from_endpoint(endpoint: str) -> str:"));
    assert!(!controller.contains("def get_verb_from_endpoint(self"));

    // tests/... stubs land in the test tree, with their records appended.
    let mocks = fs::read_to_string(dir.path().join("tests/mocks.pyi")).unwrap();
    assert!(mocks.contains("class MockChatRequestData(typing.TypedDict):"));
    assert!(mocks.contains("    prompt: str"));

    let domain = fs::read_to_string(dir.path().join("src/nexosapi/domain/requests.pyi")).unwrap();
    assert!(domain.contains("class ChatMessageData(typing.TypedDict):"));
    assert!(domain.contains("    content: typing.NotRequired[str | None]"));
    assert!(domain.contains("class ChatCompletionsRequestData(typing.TypedDict):"));
    assert!(domain.contains("    messages: list[ChatMessageData]"));
    assert!(domain.contains("    temperature: typing.NotRequired[float | None]"));
}

#[test]
fn missing_scratch_directory_keeps_the_run_alive() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();

    let config = PipelineConfig {
        source_dir: dir.path().join("src"),
        test_dir: dir.path().join("tests"),
        scratch_dir: dir.path().join("stubs"),
        ..PipelineConfig::default()
    };
    // Batch failure is logged, not returned.
    Pipeline::new(config, ManagerRegistry::default())
        .run()
        .unwrap();
}

#[test]
fn missing_source_tree_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        source_dir: dir.path().join("absent"),
        test_dir: dir.path().join("tests"),
        scratch_dir: dir.path().join("stubs"),
        ..PipelineConfig::default()
    };
    assert!(
        Pipeline::new(config, ManagerRegistry::default())
            .run()
            .is_err()
    );
}

#[test]
fn failed_stub_generator_leaves_the_scratch_tree_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = seed_workspace(dir.path());
    config.stubgen_command = Some(vec!["false".to_string()]);
    let marker = config.scratch_dir.join("nexosapi/domain/requests.pyi");

    Pipeline::new(config, ManagerRegistry::default())
        .run()
        .unwrap();

    // Nothing moved, nothing deleted: the scratch tree stays for inspection.
    assert!(marker.exists());
    assert_eq!(fs::read_to_string(&marker).unwrap(), REQUESTS_STUB);
}

#[test]
fn malformed_stubs_are_skipped_without_failing_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_workspace(dir.path());
    let scratch = config.scratch_dir.clone();

    let broken = "class Broken(:\n    def (self) ->\n";
    fs::write(scratch.join("nexosapi/api/endpoints/broken.pyi"), broken).unwrap();

    Pipeline::new(config, ManagerRegistry::default())
        .run()
        .unwrap();

    // The valid controller stub was still rewritten and relocated.
    let controller = fs::read_to_string(
        dir.path().join("src/nexosapi/api/endpoints/completions.pyi"),
    )
    .unwrap();
    assert!(controller.contains(
        "class RequestManager(ChatCompletionsEndpointController._RequestManager):"
    ));

    // The malformed stub moved along with the rest, byte-identical.
    assert_eq!(
        fs::read_to_string(dir.path().join("src/nexosapi/api/endpoints/broken.pyi")).unwrap(),
        broken
    );
}

#[test]
fn clean_stub_trees_round_trip_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_workspace(dir.path());
    let scratch = config.scratch_dir.clone();

    // A stub with no Operations class and no markers moves as-is.
    let plain = "class Settings:\n    timeout: float\n";
    fs::write(scratch.join("nexosapi/domain/models.pyi"), plain).unwrap();

    Pipeline::new(config, ManagerRegistry::default())
        .run()
        .unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("src/nexosapi/domain/models.pyi")).unwrap(),
        plain
    );
}
