// Integration test utilities and fixture repositories for seams.

use std::path::Path;
use std::process::Command;

use seams_core::config::SeamsConfig;
use seams_core::extract::{GitHistorySource, PathFilter};
use seams_core::pipeline::{AnalysisContext, CollectSummary};
use seams_core::types::{Access, AccessMode, AccessTrace, AccessTraces};

/// A test fixture with a temporary git repository.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
}

/// Day `n` of the fixture calendar, one commit per day.
fn day(n: u32) -> String {
    format!("2025-01-{:02}T10:00:00+00:00", 15 + n)
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A small Java shop with eight daily commits:
    ///
    /// 1. ann adds Order, Item, Client, Address, Legacy, and a README
    /// 2. ann changes Order and Item
    /// 3. bob renames Client to Customer and changes Address
    /// 4. bob changes Customer and Address
    /// 5. cat adds Invoice and Payment
    /// 6. cat changes Invoice and Payment
    /// 7. ann deletes Legacy
    /// 8. ann changes Order and Invoice
    pub fn shop() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/shop")).unwrap();

        git(root, &["init"], &day(0), "ann");

        for name in ["Order", "Item", "Client", "Address", "Legacy"] {
            write_class(root, name, 1);
        }
        std::fs::write(root.join("README.md"), "# Shop\n").unwrap();
        commit(root, "Initial shop", 0, "ann");

        write_class(root, "Order", 2);
        write_class(root, "Item", 2);
        commit(root, "Order items", 1, "ann");

        git(
            root,
            &["mv", "src/shop/Client.java", "src/shop/Customer.java"],
            &day(2),
            "bob",
        );
        write_class(root, "Address", 3);
        commit(root, "Rename Client to Customer", 2, "bob");

        std::fs::write(
            root.join("src/shop/Customer.java"),
            "class Client { int rev = 4; String email; }\n",
        )
        .unwrap();
        write_class(root, "Address", 4);
        commit(root, "Customer addresses", 3, "bob");

        write_class(root, "Invoice", 5);
        write_class(root, "Payment", 5);
        commit(root, "Billing", 4, "cat");

        write_class(root, "Invoice", 6);
        write_class(root, "Payment", 6);
        commit(root, "Payment retries", 5, "cat");

        git(root, &["rm", "-q", "src/shop/Legacy.java"], &day(6), "ann");
        commit(root, "Drop legacy", 6, "ann");

        write_class(root, "Order", 8);
        write_class(root, "Invoice", 8);
        commit(root, "Invoice orders", 7, "ann");

        Self { dir }
    }
}

/// Access traces over the [`TestRepo::shop`] entities.
pub fn shop_traces() -> AccessTraces {
    let trace = |accesses: &[(AccessMode, &str)]| {
        AccessTrace::new(
            accesses
                .iter()
                .map(|(mode, entity)| Access::new(*mode, *entity))
                .collect(),
        )
    };
    AccessTraces::from([
        (
            "PlaceOrder".to_string(),
            trace(&[
                (AccessMode::Read, "Customer"),
                (AccessMode::Write, "Order"),
                (AccessMode::Write, "Item"),
            ]),
        ),
        (
            "PayInvoice".to_string(),
            trace(&[
                (AccessMode::Read, "Order"),
                (AccessMode::Write, "Invoice"),
                (AccessMode::Write, "Payment"),
            ]),
        ),
        (
            "UpdateCustomer".to_string(),
            trace(&[
                (AccessMode::Write, "Customer"),
                (AccessMode::Write, "Address"),
            ]),
        ),
        (
            "ViewOrder".to_string(),
            trace(&[(AccessMode::Read, "Order"), (AccessMode::Read, "Item")]),
        ),
    ])
}

/// Collect `repo_path` with `config`, optionally up to `until`.
pub fn collect(
    repo_path: &Path,
    config: SeamsConfig,
    until: Option<&str>,
) -> seams_core::error::Result<(AnalysisContext, CollectSummary)> {
    let filter = PathFilter::from_config(&config.history)?;
    let source = GitHistorySource::new(repo_path)
        .until(until.map(String::from))
        .max_commits(config.history.max_commits)
        .filter(filter);
    AnalysisContext::collect("shop", config, &source)
}

fn write_class(root: &Path, name: &str, rev: u32) {
    std::fs::write(
        root.join(format!("src/shop/{name}.java")),
        format!("class {name} {{ int rev = {rev}; }}\n"),
    )
    .unwrap();
}

fn commit(root: &Path, message: &str, n: u32, author: &str) {
    git(root, &["add", "-A"], &day(n), author);
    git(root, &["commit", "-q", "-m", message], &day(n), author);
}

fn git(dir: &Path, args: &[&str], date: &str, author: &str) {
    let email = format!("{author}@shop.test");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", author)
        .env("GIT_AUTHOR_EMAIL", &email)
        .env("GIT_COMMITTER_NAME", author)
        .env("GIT_COMMITTER_EMAIL", &email)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .output()
        .unwrap_or_else(|e| panic!("git {}: {e}", args.join(" ")));
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("git {} failed: {stderr}", args.join(" "));
    }
}
