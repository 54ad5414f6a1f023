use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum FieldInput {
    Text,
    Number,
    Select(Vec<String>),
    Tel,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub id: String,
    pub label: String,
    pub input: FieldInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub custom: bool,
}

impl FieldDef {
    /// A user-added field: label and id are the same trimmed name.
    pub fn custom(name: &str) -> Self {
        let name = name.trim();
        Self {
            id: name.to_string(),
            label: name.to_string(),
            input: FieldInput::Text,
            placeholder: Some(format!("Enter {}", name)),
            custom: true,
        }
    }
}

/// Language-specific field catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub code: &'static str,
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
}

// (id, label, kind, placeholder-or-options)
type Row = (&'static str, &'static str, &'static str, &'static str);

const ENGLISH: &[Row] = &[
    ("Name", "Name", "text", "Enter full name"),
    ("Age", "Age", "number", "Enter age"),
    ("Gender", "Gender", "select", "Male|Female|Other"),
    ("DOB", "Date of Birth", "text", "YYYY-MM-DD"),
    ("Address", "Address", "text", "Enter address"),
    ("Country", "Country", "text", "Enter country"),
    ("Phone", "Phone", "tel", "Enter phone number"),
    ("Email", "Email", "email", "Enter email address"),
    ("ID", "ID Number", "text", "Enter ID number"),
];

const CHINESE: &[Row] = &[
    ("name", "姓名 (Name)", "text", "输入姓名"),
    ("age", "年龄 (Age)", "number", "输入年龄"),
    ("gender", "性别 (Gender)", "select", "男|女|其他"),
    ("dob", "出生日期 (DOB)", "text", "YYYY-MM-DD"),
    ("address", "地址 (Address)", "text", "输入地址"),
    ("country", "国家 (Country)", "text", "输入国家"),
    ("phone", "电话 (Phone)", "tel", "输入电话"),
    ("email", "邮箱 (Email)", "email", "输入邮箱"),
    ("id_number", "证件号码 (ID)", "text", "输入证件号码"),
];

const JAPANESE: &[Row] = &[
    ("name", "氏名 (Name)", "text", "氏名を入力"),
    ("age", "年齢 (Age)", "number", "年齢を入力"),
    ("gender", "性別 (Gender)", "select", "男性|女性|その他"),
    ("dob", "生年月日 (DOB)", "text", "YYYY-MM-DD"),
    ("address", "住所 (Address)", "text", "住所を入力"),
    ("country", "国籍 (Country)", "text", "国籍を入力"),
    ("phone", "電話番号 (Phone)", "tel", "電話番号を入力"),
    ("email", "メールアドレス (Email)", "email", "メールアドレスを入力"),
    ("id_number", "ID番号 (ID)", "text", "ID番号を入力"),
];

const KOREAN: &[Row] = &[
    ("name", "이름 (Name)", "text", "이름 입력"),
    ("age", "나이 (Age)", "number", "나이 입력"),
    ("gender", "성별 (Gender)", "select", "남성|여성|기타"),
    ("dob", "생년월일 (DOB)", "text", "YYYY-MM-DD"),
    ("address", "주소 (Address)", "text", "주소 입력"),
    ("country", "국가 (Country)", "text", "국가 입력"),
    ("phone", "전화번호 (Phone)", "tel", "전화번호 입력"),
    ("email", "이메일 (Email)", "email", "이메일 입력"),
    ("id_number", "ID 번호 (ID)", "text", "ID 번호 입력"),
];

const CATALOG: &[(&str, &str, &[Row])] = &[
    ("en", "English", ENGLISH),
    ("ch", "中文 (Chinese)", CHINESE),
    ("ja", "日本語 (Japanese)", JAPANESE),
    ("ko", "한국어 (Korean)", KOREAN),
];

fn field_from_row(&(id, label, kind, extra): &Row) -> FieldDef {
    let (input, placeholder) = match kind {
        "number" => (FieldInput::Number, Some(extra)),
        "select" => (
            FieldInput::Select(extra.split('|').map(String::from).collect()),
            None,
        ),
        "tel" => (FieldInput::Tel, Some(extra)),
        "email" => (FieldInput::Email, Some(extra)),
        _ => (FieldInput::Text, Some(extra)),
    };
    FieldDef {
        id: id.to_string(),
        label: label.to_string(),
        input,
        placeholder: placeholder.map(String::from),
        custom: false,
    }
}

/// Built-in template for a language code (`en`, `ch`, `ja`, `ko`).
pub fn template(code: &str) -> Option<Template> {
    CATALOG
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code.trim()))
        .map(|&(code, name, rows)| Template {
            code,
            name,
            fields: rows.iter().map(field_from_row).collect(),
        })
}

pub fn templates() -> Vec<Template> {
    CATALOG
        .iter()
        .filter_map(|(code, _, _)| template(code))
        .collect()
}

/// Ordered set of fields requested for one extraction or verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSet {
    fields: Vec<FieldDef>,
}

impl FieldSet {
    pub fn from_template(template: &Template) -> Self {
        Self {
            fields: template.fields.clone(),
        }
    }

    /// Field ids only, for callers without a template.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for id in ids {
            set.add_custom(id.as_ref());
        }
        set
    }

    /// Add a custom field. Blank names and duplicate ids are rejected.
    pub fn add_custom(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.fields.push(FieldDef::custom(name));
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.id != id);
        self.fields.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.iter().any(|f| f.id == id)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn ids(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
