//! Runtime profile inference.

use crate::applier::RuntimeProfile;
use crate::core::ProjectGraph;

pub const BROWSER_SDK: &str = "Microsoft.NET.Sdk.BlazorWebAssembly";
pub const WEB_SDK: &str = "Microsoft.NET.Sdk.Web";

/// Which runtime shape the root project runs as.
///
/// A browser SDK root runs in the browser. A web root that references a
/// browser project hosts it. Everything else runs in-process.
pub fn infer_profile(graph: &ProjectGraph) -> RuntimeProfile {
    let root = graph.root();
    if root.has_sdk(BROWSER_SDK) {
        return RuntimeProfile::Browser;
    }
    let hosts_browser_app = root.references.iter().any(|reference| {
        graph
            .get(reference)
            .is_some_and(|node| node.has_sdk(BROWSER_SDK))
    });
    if root.has_sdk(WEB_SDK) && hosts_browser_app {
        RuntimeProfile::Hosted
    } else {
        RuntimeProfile::Process
    }
}
