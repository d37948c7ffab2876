//! Tenant isolation under concurrent, interleaved ingests.

use std::sync::Arc;

use vault_rag::{Document, HashEmbeddingProvider, RetrievalEngine, TenantId};

const TENANTS: [&str; 3] = ["acme", "globex", "initech"];
const DOCS_PER_TENANT: usize = 6;

fn secret(tenant: &str, i: usize) -> String {
    format!("{tenant}codeword{i}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingests_never_leak_across_tenants() {
    let engine = Arc::new(
        RetrievalEngine::builder()
            .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..DOCS_PER_TENANT {
        for name in TENANTS {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let tenant = TenantId::new(name).unwrap();
                let text = format!("Internal memo number {i} mentions {} and nothing else.", secret(name, i));
                engine.ingest(&tenant, &Document::new(text)).await.unwrap()
            }));
        }
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().chunks_added, 1);
    }

    for name in TENANTS {
        let tenant = TenantId::new(name).unwrap();
        assert_eq!(engine.stats(&tenant).await.unwrap().chunk_count, DOCS_PER_TENANT);

        let hits = engine.retrieve(&tenant, "internal memo", 50, None).await.unwrap();
        assert_eq!(hits.len(), DOCS_PER_TENANT);
        assert!(hits.iter().all(|hit| hit.metadata["tenant_id"] == name));
        assert!(hits.iter().all(|hit| hit.text.contains(&format!("{name}codeword"))));

        for other in TENANTS.iter().filter(|other| **other != name) {
            let foreign = secret(other, 0);
            let hits = engine.retrieve(&tenant, &foreign, 50, None).await.unwrap();
            assert!(hits.iter().all(|hit| !hit.text.contains(&foreign)), "{name} saw {foreign}");
        }
    }

    let mut tenants: Vec<String> = engine.tenants().await.unwrap().into_iter().map(String::from).collect();
    tenants.sort();
    assert_eq!(tenants, TENANTS);
}

#[tokio::test]
async fn same_document_in_two_tenants_is_stored_twice() {
    let engine = RetrievalEngine::builder()
        .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
        .build()
        .unwrap();
    let doc = Document::new("A shared onboarding checklist for every new hire.");
    let a = TenantId::new("a").unwrap();
    let b = TenantId::new("b").unwrap();

    assert_eq!(engine.ingest(&a, &doc).await.unwrap().chunks_added, 1);
    assert_eq!(engine.ingest(&b, &doc).await.unwrap().chunks_added, 1);

    engine.delete_tenant(&a).await.unwrap();
    assert!(engine.retrieve(&a, "onboarding checklist", 5, None).await.unwrap().is_empty());
    assert_eq!(engine.retrieve(&b, "onboarding checklist", 5, None).await.unwrap().len(), 1);
}
