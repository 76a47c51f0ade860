use std::sync::Arc;

use anyhow::Result;
use devhub_store::{
    CodeSnippet, Database, LocalBlobStore, SnippetRepository, StorageAdapter, Upload, UrlSigner,
};

async fn setup(temp: &tempfile::TempDir) -> Result<(SnippetRepository, StorageAdapter)> {
    let db_url = format!("sqlite://{}", temp.path().join("devhub.db").display());
    let db = Database::connect(&db_url).await?;
    let signer = UrlSigner::new(b"integration-key".to_vec())?;
    let blobs = LocalBlobStore::new(temp.path().join("blobs"), "http://localhost", signer);

    Ok((
        SnippetRepository::new(Arc::new(db)),
        StorageAdapter::new(Arc::new(blobs), "devhub-test"),
    ))
}

#[tokio::test]
async fn snippet_owns_its_uploaded_blob() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (snippets, storage) = setup(&temp).await?;

    let source = b"def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\n";
    let locator = storage
        .upload(
            Upload {
                bytes: source,
                content_type: Some("text/x-python"),
                original_filename: Some("fib.py"),
            },
            "snippets",
        )
        .await?;

    let id = snippets
        .create(CodeSnippet {
            title: "Fib".into(),
            code: String::from_utf8_lossy(source).into_owned(),
            language: "python".into(),
            blob_locator: Some(locator.clone()),
            is_public: true,
            ..CodeSnippet::default()
        })
        .await?;

    let stored = snippets.get_by_id(&id).await?.expect("snippet stored");
    assert_eq!(stored.blob_locator.as_deref(), Some(locator.as_str()));
    assert!(storage.exists(&locator).await?);

    if let Some(locator) = stored.blob_locator.as_deref() {
        assert!(storage.delete(locator).await?);
    }
    snippets.delete(&id).await?;

    assert!(snippets.get_by_id(&id).await?.is_none());
    assert!(!storage.exists(&locator).await?);
    Ok(())
}

#[tokio::test]
async fn file_backed_database_persists_across_connections() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let id = {
        let (snippets, _) = setup(&temp).await?;
        snippets
            .create(CodeSnippet {
                title: "persist".into(),
                code: "x".into(),
                language: "text".into(),
                ..CodeSnippet::default()
            })
            .await?
    };

    let (snippets, _) = setup(&temp).await?;
    let stored = snippets.get_by_id(&id).await?.expect("snippet persisted");
    assert_eq!(stored.title, "persist");
    Ok(())
}
