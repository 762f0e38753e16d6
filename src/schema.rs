diesel::table! {
    workspaces (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    knowledge_bases (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    collections (id) {
        id -> Uuid,
        knowledge_base_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        collection_id -> Uuid,
        filename -> Varchar,
        mime_type -> Nullable<Varchar>,
        size_bytes -> Int8,
        storage_path -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    datasets (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        name -> Varchar,
        filename -> Varchar,
        mime_type -> Nullable<Varchar>,
        size_bytes -> Int8,
        storage_path -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(knowledge_bases -> workspaces (workspace_id));
diesel::joinable!(collections -> knowledge_bases (knowledge_base_id));
diesel::joinable!(documents -> collections (collection_id));
diesel::joinable!(datasets -> workspaces (workspace_id));

diesel::allow_tables_to_appear_in_same_query!(
    workspaces,
    knowledge_bases,
    collections,
    documents,
    datasets,
);
