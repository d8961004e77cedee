use crate::inference::Prediction;
use crate::Result;
use minijinja::{context, Environment};

/// 页面模板，启动时编译一次
///
/// 模板名以 `.html` 结尾，minijinja 会自动转义所有插值。
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../../templates/base.html"))?;
        env.add_template("upload.html", include_str!("../../templates/upload.html"))?;
        env.add_template("result.html", include_str!("../../templates/result.html"))?;
        Ok(Self { env })
    }

    /// 上传表单，校验失败时附带错误信息
    pub fn upload_form(&self, error: Option<&str>) -> Result<String> {
        let template = self.env.get_template("upload.html")?;
        Ok(template.render(context! { error => error })?)
    }

    /// 预测结果页
    pub fn result(&self, prediction: &Prediction, image_url: &str) -> Result<String> {
        let template = self.env.get_template("result.html")?;
        Ok(template.render(context! {
            label => prediction.label,
            index => prediction.index,
            probability => format!("{:.4}", prediction.probability),
            image_url => image_url,
        })?)
    }
}
