// ==========================================
// 地铁列车夜间投运决策系统 - 权重配置档
// ==========================================
// 存储位置: config_kv (scope_id='global', key='weight_profile/{MODE}')
// 格式: {"evaluators": {"branding": 0.3, ...}, "readiness": 0.2}
// ==========================================

use crate::domain::scenario::WeightOverrides;
use crate::domain::types::PlanningMode;

/// 权重配置档的 config_kv 键
pub fn weight_profile_key(mode: PlanningMode) -> String {
    format!("weight_profile/{}", mode.as_str())
}

/// 解析权重配置档
///
/// # 返回
/// - Ok(overrides): 解析成功且权重合法
/// - Err(msg): JSON 格式错误或含负数/非有限权重
pub fn parse_weight_profile(raw: &str) -> Result<WeightOverrides, String> {
    let overrides: WeightOverrides =
        serde_json::from_str(raw).map_err(|e| format!("权重配置解析失败: {}", e))?;
    validate_weight_overrides(&overrides)?;
    Ok(overrides)
}

/// 校验权重覆写 (每项 >= 0 且有限)
pub fn validate_weight_overrides(overrides: &WeightOverrides) -> Result<(), String> {
    for (kind, w) in &overrides.evaluators {
        if !w.is_finite() || *w < 0.0 {
            return Err(format!("评估器 {} 权重非法: {}", kind, w));
        }
    }
    if let Some(r) = overrides.readiness {
        if !r.is_finite() || r < 0.0 {
            return Err(format!("就绪权重非法: {}", r));
        }
    }
    Ok(())
}
