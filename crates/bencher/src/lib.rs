/// One request a benchmark sends through a router or a gateway.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    method: &'static str,
    uri: &'static str,
}

impl TestCase {
    pub const fn new(name: &'static str, group: TestGroup, method: &'static str, uri: &'static str) -> Self {
        Self { name, group, method, uri }
    }

    pub const fn get(name: &'static str, group: TestGroup, uri: &'static str) -> Self {
        Self::new(name, group, "GET", uri)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn uri(&self) -> &'static str {
        self.uri
    }
}

/// Where the matching route sits in the table.
#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    /// A static route registered first.
    Static,
    /// A route with converters in the middle of the table.
    Dynamic,
    /// Nothing matches, every route is tried.
    Miss,
}

/// Static paths `/static/0`..`/static/{count}` followed by item and nested paths per resource.
pub fn route_paths(count: usize) -> Vec<String> {
    let mut paths: Vec<String> = (0..count).map(|i| format!("/static/{i}")).collect();
    for i in 0..count {
        paths.push(format!("/resource{i}/<int:id>"));
        paths.push(format!("/resource{i}/<int:id>/children/<uuid:child>"));
    }
    paths
}

pub fn test_cases() -> Vec<TestCase> {
    vec![
        TestCase::get("static_first", TestGroup::Static, "/static/0"),
        TestCase::get("dynamic_int", TestGroup::Dynamic, "/resource10/42"),
        TestCase::get("dynamic_uuid", TestGroup::Dynamic, "/resource10/42/children/6f1c6b1e-8e0b-4c3a-9a53-0f7f3b2b3c4d"),
        TestCase::get("miss", TestGroup::Miss, "/nowhere/to/be/found"),
    ]
}
